// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use super::*;
use crate::store::Database;

/// Mock agent: answers `POST /execute` with `status` and `body`, recording payloads.
async fn mock_agent(
    status: u16,
    body: &'static str,
    delay: Duration,
) -> anyhow::Result<(SocketAddr, Arc<Mutex<Vec<serde_json::Value>>>)> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&received);

    let app = Router::new().route(
        "/execute",
        post(move |Json(payload): Json<serde_json::Value>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().await.push(payload);
                tokio::time::sleep(delay).await;
                (
                    axum::http::StatusCode::from_u16(status)
                        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                    body,
                )
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, received))
}

/// An address nothing listens on.
async fn closed_addr() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

async fn setup(timeout: Duration) -> anyhow::Result<(Registry, Dispatcher)> {
    let registry = Registry::new(Database::open_in_memory().await?);
    let dispatcher = Dispatcher::new(registry.clone(), timeout, "/execute")?;
    Ok((registry, dispatcher))
}

#[tokio::test]
async fn delivered_command_is_recorded() -> anyhow::Result<()> {
    let (addr, received) = mock_agent(200, "pong", Duration::ZERO).await?;
    let (registry, dispatcher) = setup(Duration::from_secs(5)).await?;
    let client = registry.register_client(&addr.to_string()).await?.client;

    let outcome = dispatcher.dispatch(client.id, "ping").await?;
    assert_eq!(outcome.address, addr.to_string());
    assert_eq!(outcome.response, "pong");

    assert_eq!(*received.lock().await, vec![serde_json::json!({ "command": "ping" })]);

    let command = registry.get_command(outcome.command_id).await?;
    assert_eq!(command.client_id, client.id);
    assert_eq!(command.status, CommandStatus::Delivered);
    assert_eq!(command.result.as_deref(), Some("pong"));
    Ok(())
}

#[tokio::test]
async fn unreachable_agent_fails_command() -> anyhow::Result<()> {
    let addr = closed_addr().await?;
    let (registry, dispatcher) = setup(Duration::from_secs(5)).await?;
    let client = registry.register_client(&addr.to_string()).await?.client;

    let err = dispatcher.dispatch(client.id, "ping").await;
    assert!(matches!(err, Err(RelayError::DispatchFailed { .. })), "{err:?}");

    let commands = registry.list_commands_for_client(client.id).await?;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].status, CommandStatus::Failed);
    assert!(commands[0].result.is_some());
    Ok(())
}

#[tokio::test]
async fn rejection_carries_agent_status() -> anyhow::Result<()> {
    let (addr, _) = mock_agent(503, "busy", Duration::ZERO).await?;
    let (registry, dispatcher) = setup(Duration::from_secs(5)).await?;
    let client = registry.register_client(&addr.to_string()).await?.client;

    match dispatcher.dispatch(client.id, "ping").await {
        Err(RelayError::DispatchRejected { status, address }) => {
            assert_eq!(status, 503);
            assert_eq!(address, addr.to_string());
        }
        other => anyhow::bail!("expected rejection, got {other:?}"),
    }

    let commands = registry.list_commands_for_client(client.id).await?;
    assert_eq!(commands[0].status, CommandStatus::Failed);
    assert_eq!(commands[0].result.as_deref(), Some("agent responded with status 503"));
    Ok(())
}

#[tokio::test]
async fn slow_agent_times_out() -> anyhow::Result<()> {
    let (addr, _) = mock_agent(200, "late", Duration::from_secs(3)).await?;
    let (registry, dispatcher) = setup(Duration::from_millis(200)).await?;
    let client = registry.register_client(&addr.to_string()).await?.client;

    let started = std::time::Instant::now();
    let err = dispatcher.dispatch(client.id, "sleep 3").await;
    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        Err(RelayError::DispatchFailed { reason, .. }) => assert!(reason.contains("200ms"), "{reason}"),
        other => anyhow::bail!("expected timeout, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn dispatch_to_unknown_client_records_nothing() -> anyhow::Result<()> {
    let (registry, dispatcher) = setup(Duration::from_secs(1)).await?;

    let err = dispatcher.dispatch(7, "ping").await;
    assert!(matches!(err, Err(RelayError::NotFound(_))), "{err:?}");
    assert!(registry.list_clients().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn dispatch_empty_command_is_rejected_before_relay() -> anyhow::Result<()> {
    let (addr, received) = mock_agent(200, "", Duration::ZERO).await?;
    let (registry, dispatcher) = setup(Duration::from_secs(5)).await?;
    let client = registry.register_client(&addr.to_string()).await?.client;

    let err = dispatcher.dispatch(client.id, "").await;
    assert!(matches!(err, Err(RelayError::Validation(_))), "{err:?}");
    assert!(received.lock().await.is_empty());
    assert!(registry.list_commands_for_client(client.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn queued_command_relays_once() -> anyhow::Result<()> {
    let (addr, received) = mock_agent(200, "done", Duration::ZERO).await?;
    let (registry, dispatcher) = setup(Duration::from_secs(5)).await?;
    let client = registry.register_client(&addr.to_string()).await?.client;
    let command_id = registry.enqueue_command(client.id, "uptime").await?;

    let outcome = dispatcher.relay_queued(command_id).await?;
    assert_eq!(outcome.command_id, command_id);
    assert_eq!(registry.get_command(command_id).await?.status, CommandStatus::Delivered);

    let again = dispatcher.relay_queued(command_id).await;
    assert!(matches!(again, Err(RelayError::Validation(_))), "{again:?}");
    assert_eq!(received.lock().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_relays_of_one_command_reach_agent_once() -> anyhow::Result<()> {
    let (addr, received) = mock_agent(200, "done", Duration::from_millis(300)).await?;
    let (registry, dispatcher) = setup(Duration::from_secs(5)).await?;
    let client = registry.register_client(&addr.to_string()).await?.client;
    let command_id = registry.enqueue_command(client.id, "uptime").await?;

    let (a, b) = tokio::join!(dispatcher.relay_queued(command_id), dispatcher.relay_queued(command_id));

    let delivered = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(delivered, 1, "a={a:?} b={b:?}");
    assert!(
        matches!(a, Err(RelayError::Validation(_))) || matches!(b, Err(RelayError::Validation(_))),
        "a={a:?} b={b:?}"
    );
    assert_eq!(received.lock().await.len(), 1);
    assert_eq!(registry.get_command(command_id).await?.status, CommandStatus::Delivered);
    Ok(())
}

#[tokio::test]
async fn oversized_agent_response_is_capped() -> anyhow::Result<()> {
    let body = "x".repeat(MAX_RESULT_BYTES * 4);
    let app = Router::new().route(
        "/execute",
        post(move || {
            let body = body.clone();
            async move { body }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let (registry, dispatcher) = setup(Duration::from_secs(5)).await?;
    let client = registry.register_client(&addr.to_string()).await?.client;

    let outcome = dispatcher.dispatch(client.id, "cat big.log").await?;
    assert_eq!(outcome.response.len(), MAX_RESULT_BYTES);

    let command = registry.get_command(outcome.command_id).await?;
    assert_eq!(command.status, CommandStatus::Delivered);
    assert_eq!(command.result.map(|r| r.len()), Some(MAX_RESULT_BYTES));
    Ok(())
}

#[tokio::test]
async fn empty_command_is_rejected_before_client_lookup() -> anyhow::Result<()> {
    let (_, dispatcher) = setup(Duration::from_secs(1)).await?;

    let err = dispatcher.dispatch(7, "  ").await;
    assert!(matches!(err, Err(RelayError::Validation(_))), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn malformed_address_is_a_dispatch_failure() -> anyhow::Result<()> {
    let (registry, dispatcher) = setup(Duration::from_secs(1)).await?;
    let client = registry.register_client("not a host:port").await?.client;

    let err = dispatcher.dispatch(client.id, "ping").await;
    assert!(matches!(err, Err(RelayError::DispatchFailed { .. })), "{err:?}");
    Ok(())
}

#[test]
fn agent_url_joins_address_and_path() -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let (_, dispatcher) = rt.block_on(setup(Duration::from_secs(1)))?;
    assert_eq!(dispatcher.agent_url("10.0.0.3:9001"), "http://10.0.0.3:9001/execute");
    Ok(())
}

#[test]
fn truncation_respects_char_boundaries() {
    assert_eq!(truncate_utf8("hello".to_owned(), 10), "hello");
    assert_eq!(truncate_utf8("hello".to_owned(), 3), "hel");
    // 'é' is two bytes; cutting inside it backs off to the previous boundary.
    assert_eq!(truncate_utf8("héllo".to_owned(), 2), "h");
}
