// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the relay API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{Extensions, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchOutcome;
use crate::error::RelayError;
use crate::registry::join_host_port;
use crate::state::RelayState;
use crate::store::{Client, ClientId, Command, CommandId, CommandStatus};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub client_count: i64,
}

/// Body of `POST /register`. The stored address is `ip:port`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<PortField>,
}

/// Agents send the port either as a JSON number or as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortField {
    Number(u64),
    Text(String),
}

impl RegisterRequest {
    /// The `host:port` address to register.
    pub fn address(&self) -> Result<String, RelayError> {
        let missing = || RelayError::Validation("ip and port fields are required".to_owned());

        let ip = self.ip.as_deref().map(str::trim).filter(|ip| !ip.is_empty()).ok_or_else(missing)?;
        let port = match &self.port {
            Some(PortField::Number(n)) => u16::try_from(*n).ok(),
            Some(PortField::Text(s)) if !s.trim().is_empty() => s.trim().parse::<u16>().ok(),
            _ => return Err(missing()),
        };
        let port = port
            .filter(|p| *p != 0)
            .ok_or_else(|| RelayError::Validation("port must be between 1 and 65535".to_owned()))?;

        Ok(join_host_port(ip, port))
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: ClientId,
    pub address: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub command_id: CommandId,
    pub address: String,
    pub status: CommandStatus,
    pub message: String,
    pub response: String,
}

impl From<DispatchOutcome> for ExecuteResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        Self {
            command_id: outcome.command_id,
            message: format!("Command sent successfully to client at {}", outcome.address),
            address: outcome.address,
            status: CommandStatus::Delivered,
            response: outcome.response,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: CommandId,
    pub client_id: ClientId,
    pub status: CommandStatus,
}

#[derive(Debug, Serialize)]
pub struct DeregisterResponse {
    pub id: ClientId,
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommandsQuery {
    #[serde(default)]
    pub client_id: Option<ClientId>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<RelayState>>) -> Result<Json<HealthResponse>, RelayError> {
    let client_count = s.registry.client_count().await?;
    Ok(Json(HealthResponse { status: "running".to_owned(), client_count }))
}

/// `POST /register`: register an agent. 201 when new, 200 on re-registration.
pub async fn register_client(
    State(s): State<Arc<RelayState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), RelayError> {
    let Json(req) = payload.map_err(bad_payload)?;
    let address = req.address()?;

    let reg = s.registry.register_client(&address).await?;
    let status = if reg.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(RegisterResponse {
            id: reg.client.id,
            address: reg.client.address,
            message: "Client registered".to_owned(),
        }),
    ))
}

/// `GET /clients`
pub async fn list_clients(
    State(s): State<Arc<RelayState>>,
) -> Result<Json<Vec<Client>>, RelayError> {
    Ok(Json(s.registry.list_clients().await?))
}

/// `GET /client/{id}`
pub async fn get_client(
    State(s): State<Arc<RelayState>>,
    Path(id): Path<String>,
) -> Result<Json<Client>, RelayError> {
    let id = parse_id(&id, "client")?;
    Ok(Json(s.registry.get_client(id).await?))
}

/// `DELETE /client/{id}`: deregister a client and drop its commands.
pub async fn deregister_client(
    State(s): State<Arc<RelayState>>,
    Path(id): Path<String>,
) -> Result<Json<DeregisterResponse>, RelayError> {
    let id = parse_id(&id, "client")?;
    s.registry.deregister_client(id).await?;
    Ok(Json(DeregisterResponse { id, removed: true }))
}

/// `GET /client/{id}/commands`: every command recorded for a client.
pub async fn client_commands(
    State(s): State<Arc<RelayState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Command>>, RelayError> {
    let id = parse_id(&id, "client")?;
    Ok(Json(s.registry.list_commands_for_client(id).await?))
}

/// `POST /client/{id}/execute`: record a command and relay it now.
pub async fn execute_command(
    State(s): State<Arc<RelayState>>,
    Path(id): Path<String>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, RelayError> {
    let id = parse_id(&id, "client")?;
    let Json(req) = payload.map_err(bad_payload)?;

    let outcome = s.dispatcher.dispatch(id, &req.command).await?;
    Ok(Json(outcome.into()))
}

/// `POST /client/{id}/command`: queue a command for the agent to poll.
pub async fn enqueue_command(
    State(s): State<Arc<RelayState>>,
    Path(id): Path<String>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnqueueResponse>), RelayError> {
    let client_id = parse_id(&id, "client")?;
    let Json(req) = payload.map_err(bad_payload)?;

    let id = s.registry.enqueue_command(client_id, &req.command).await?;
    Ok((
        StatusCode::CREATED,
        Json(EnqueueResponse { id, client_id, status: CommandStatus::Queued }),
    ))
}

/// `POST /command/{id}/relay`: relay a queued command now.
pub async fn relay_command(
    State(s): State<Arc<RelayState>>,
    Path(id): Path<String>,
) -> Result<Json<ExecuteResponse>, RelayError> {
    let id = parse_id(&id, "command")?;
    let outcome = s.dispatcher.relay_queued(id).await?;
    Ok(Json(outcome.into()))
}

/// `GET /commands`: commands for the calling agent.
///
/// The caller is `?client_id=` when given, otherwise the single client
/// registered from the peer's IP.
pub async fn poll_commands(
    State(s): State<Arc<RelayState>>,
    extensions: Extensions,
    query: Result<Query<CommandsQuery>, QueryRejection>,
) -> Result<Json<Vec<Command>>, RelayError> {
    let Query(query) = query.map_err(|e| RelayError::Validation(e.body_text()))?;

    let client = match query.client_id {
        Some(id) => s.registry.get_client(id).await?,
        None => {
            let peer = extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_canonical())
                .ok_or_else(|| {
                    RelayError::Validation("unable to determine client IP".to_owned())
                })?;
            s.registry.get_client_by_host(&peer.to_string()).await?
        }
    };

    Ok(Json(s.registry.list_commands_for_client(client.id).await?))
}

// -- Helpers ------------------------------------------------------------------

fn parse_id(raw: &str, what: &str) -> Result<i64, RelayError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| RelayError::Validation(format!("invalid {what} id: {raw}")))
}

fn bad_payload(rejection: JsonRejection) -> RelayError {
    RelayError::Validation(format!("invalid request payload: {}", rejection.body_text()))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
