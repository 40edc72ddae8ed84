// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cmdrelay: register remote agents and relay commands to them.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod state;
pub mod store;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RelayConfig;
use crate::state::RelayState;
use crate::store::Database;
use crate::transport::build_router;

/// Run the relay server until a shutdown signal arrives.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    serve(config, shutdown).await
}

/// Run the relay server until `shutdown` is cancelled.
///
/// The database is opened before the listener is bound and closed after the
/// last in-flight request has finished.
pub async fn serve(config: RelayConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let db = Database::open(&config.database).await?;
    serve_database(&config, db, shutdown).await
}

/// Serve on an already-open database, closing it on every exit path.
pub async fn serve_database(
    config: &RelayConfig,
    db: Database,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let result = serve_until(config, db.clone(), shutdown).await;
    db.close().await;
    result?;
    info!("cmdrelay stopped");
    Ok(())
}

async fn serve_until(
    config: &RelayConfig,
    db: Database,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let state = Arc::new(RelayState::new(config, db)?);
    let router = build_router(state);

    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!("cmdrelay listening on {}", listener.local_addr()?);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
