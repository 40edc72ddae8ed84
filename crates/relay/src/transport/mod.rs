// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for operators and polling agents.

pub mod http;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::state::RelayState;

/// Build the axum `Router` with all relay routes.
pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        // Registry
        .route("/register", post(http::register_client))
        .route("/clients", get(http::list_clients))
        .route("/client/{id}", get(http::get_client).delete(http::deregister_client))
        .route("/client/{id}/commands", get(http::client_commands))
        // Dispatch
        .route("/client/{id}/execute", post(http::execute_command))
        .route("/client/{id}/command", post(http::enqueue_command))
        .route("/command/{id}/relay", post(http::relay_command))
        // Agent polling
        .route("/commands", get(http::poll_commands))
        // Request logging; observes only.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
