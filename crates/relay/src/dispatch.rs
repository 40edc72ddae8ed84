// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous relay of commands to agents.
//!
//! Every relay is recorded: the command row is created `queued` and claimed
//! before the outbound call, then moved to `delivered` or `failed` once the
//! agent has answered (or could not be reached). A command is claimed at most
//! once, so it is never sent twice. There is no retry.

use std::sync::Once;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::registry::Registry;
use crate::store::{self, ClientId, CommandId, CommandStatus};

/// Agent response bodies longer than this are cut before being stored.
const MAX_RESULT_BYTES: usize = 64 * 1024;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Wire payload sent to an agent.
#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    command: &'a str,
}

/// A command the agent accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub command_id: CommandId,
    /// Address the command was delivered to.
    pub address: String,
    /// Agent response body, possibly empty.
    pub response: String,
}

/// Relays commands to registered agents over HTTP.
pub struct Dispatcher {
    registry: Registry,
    client: Client,
    agent_path: String,
    timeout: Duration,
}

impl Dispatcher {
    /// Build a dispatcher whose outbound calls give up after `timeout`.
    pub fn new(
        registry: Registry,
        timeout: Duration,
        agent_path: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        ensure_crypto_provider();
        // Agents are addressed directly; environment proxies do not apply.
        let client =
            Client::builder().timeout(timeout).connect_timeout(timeout).no_proxy().build()?;
        Ok(Self { registry, client, agent_path: agent_path.into(), timeout })
    }

    /// Record `text` for `client_id` and deliver it immediately.
    pub async fn dispatch(
        &self,
        client_id: ClientId,
        text: &str,
    ) -> Result<DispatchOutcome, RelayError> {
        if text.trim().is_empty() {
            return Err(RelayError::Validation("command is required".to_owned()));
        }
        let client = self.registry.get_client(client_id).await?;
        let command_id = self.registry.enqueue_command(client.id, text).await?;
        self.claim(command_id).await?;
        self.relay(&client, command_id, text).await
    }

    /// Deliver a command that was previously queued.
    ///
    /// Commands that are terminal or already claimed by another relay are
    /// refused, so nothing is relayed twice.
    pub async fn relay_queued(&self, command_id: CommandId) -> Result<DispatchOutcome, RelayError> {
        let command = self.registry.get_command(command_id).await?;
        if command.status.is_terminal() {
            return Err(RelayError::Validation(format!(
                "command {command_id} is already {}",
                command.status
            )));
        }
        let client = self.registry.get_client(command.client_id).await?;
        self.claim(command.id).await?;
        self.relay(&client, command.id, &command.text).await
    }

    /// URL of the command endpoint for an agent at `address`.
    pub fn agent_url(&self, address: &str) -> String {
        format!("http://{address}{}", self.agent_path)
    }

    async fn claim(&self, command_id: CommandId) -> Result<(), RelayError> {
        if self.registry.claim_command(command_id).await? {
            return Ok(());
        }
        debug!(command_id, "command claimed elsewhere");
        Err(RelayError::Validation(format!("command {command_id} is already being relayed")))
    }

    async fn relay(
        &self,
        client: &store::Client,
        command_id: CommandId,
        text: &str,
    ) -> Result<DispatchOutcome, RelayError> {
        let url = self.agent_url(&client.address);
        debug!(client_id = client.id, command_id, url = %url, "relaying command");

        let resp = match self.client.post(&url).json(&AgentRequest { command: text }).send().await
        {
            Ok(resp) => resp,
            Err(e) => {
                let reason = self.transport_reason(&e);
                warn!(client_id = client.id, command_id, url = %url, err = %reason, "relay failed");
                self.finish(command_id, CommandStatus::Failed, &reason).await?;
                return Err(RelayError::DispatchFailed { address: client.address.clone(), reason });
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let status = status.as_u16();
            warn!(client_id = client.id, command_id, status, "agent rejected command");
            let reason = format!("agent responded with status {status}");
            self.finish(command_id, CommandStatus::Failed, &reason).await?;
            return Err(RelayError::DispatchRejected { address: client.address.clone(), status });
        }

        // The agent has accepted; a body that fails to arrive does not undo that.
        let response = match read_capped(resp, MAX_RESULT_BYTES).await {
            Ok(body) => body,
            Err(e) => {
                debug!(command_id, err = %e, "failed to read agent response body");
                String::new()
            }
        };
        self.finish(command_id, CommandStatus::Delivered, &response).await?;

        info!(client_id = client.id, command_id, address = %client.address, "command delivered");
        Ok(DispatchOutcome { command_id, address: client.address.clone(), response })
    }

    async fn finish(
        &self,
        command_id: CommandId,
        status: CommandStatus,
        result: &str,
    ) -> Result<(), RelayError> {
        if !self.registry.complete_command(command_id, status, Some(result)).await? {
            debug!(command_id, %status, "command already terminal; outcome not recorded");
        }
        Ok(())
    }

    fn transport_reason(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("no response within {}ms", self.timeout.as_millis())
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else if err.is_builder() {
            format!("invalid agent address: {err}")
        } else {
            err.to_string()
        }
    }
}

/// Read at most `max` bytes of the response body, decoding it lossily.
///
/// Reading stops as soon as the cap is reached; the rest of the body is
/// never buffered.
async fn read_capped(mut resp: reqwest::Response, max: usize) -> Result<String, reqwest::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = max.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buf.len() >= max {
            break;
        }
    }
    // Drop a multi-byte char split by the cap rather than replacing it.
    if let Err(e) = std::str::from_utf8(&buf) {
        if e.error_len().is_none() {
            buf.truncate(e.valid_up_to());
        }
    }
    Ok(truncate_utf8(String::from_utf8_lossy(&buf).into_owned(), max))
}

/// Cut `s` to at most `max` bytes on a char boundary.
fn truncate_utf8(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
