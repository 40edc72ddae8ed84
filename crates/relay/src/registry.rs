// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bookkeeping of registered clients and the commands queued for them.
//!
//! The registry validates caller input and translates store results into
//! [`RelayError`]s. It performs no networking.

use tracing::{debug, info};

use crate::error::RelayError;
use crate::store::{Client, ClientId, Command, CommandId, CommandStatus, Database, DatabaseError};

/// Result of [`Registry::register_client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub client: Client,
    /// `false` when the address was already registered.
    pub created: bool,
}

#[derive(Clone)]
pub struct Registry {
    db: Database,
}

impl Registry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register the agent listening at `address`.
    ///
    /// Re-registering a known address returns the existing client.
    pub async fn register_client(&self, address: &str) -> Result<Registration, RelayError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(RelayError::Validation("address is required".to_owned()));
        }

        let (client, created) = self.db.upsert_client(address).await?;
        if created {
            info!(client_id = client.id, address = %client.address, "client registered");
        } else {
            debug!(client_id = client.id, address = %client.address, "client re-registered");
        }
        Ok(Registration { client, created })
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>, RelayError> {
        Ok(self.db.list_clients().await?)
    }

    pub async fn client_count(&self) -> Result<i64, RelayError> {
        Ok(self.db.count_clients().await?)
    }

    pub async fn get_client(&self, id: ClientId) -> Result<Client, RelayError> {
        self.db.get_client(id).await?.ok_or_else(|| client_not_found(id))
    }

    /// Resolve the single client whose address starts with `prefix`.
    ///
    /// Unique-match: zero or several matches are both `NotFound`.
    pub async fn get_client_by_address_prefix(&self, prefix: &str) -> Result<Client, RelayError> {
        if prefix.is_empty() {
            return Err(RelayError::Validation("address prefix is required".to_owned()));
        }

        let mut matches = self.db.find_clients_by_address_prefix(prefix, 2).await?;
        match matches.len() {
            0 => Err(RelayError::NotFound(format!("no client registered for {prefix}"))),
            1 => Ok(matches.remove(0)),
            _ => Err(RelayError::NotFound(format!(
                "multiple clients registered for {prefix}; pass client_id"
            ))),
        }
    }

    /// Resolve the single client registered from `host` (any port).
    pub async fn get_client_by_host(&self, host: &str) -> Result<Client, RelayError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(RelayError::Validation("caller host is required".to_owned()));
        }
        self.get_client_by_address_prefix(&format!("{}:", bracket_host(host))).await
    }

    /// Remove a client together with all of its commands.
    pub async fn deregister_client(&self, id: ClientId) -> Result<(), RelayError> {
        if !self.db.delete_client(id).await? {
            return Err(client_not_found(id));
        }
        info!(client_id = id, "client deregistered");
        Ok(())
    }

    /// Queue `text` for `client_id` with status `queued`.
    pub async fn enqueue_command(
        &self,
        client_id: ClientId,
        text: &str,
    ) -> Result<CommandId, RelayError> {
        if text.trim().is_empty() {
            return Err(RelayError::Validation("command is required".to_owned()));
        }

        let id = match self.db.insert_command(client_id, text).await {
            Ok(id) => id,
            Err(DatabaseError::ForeignKey(_)) => return Err(client_not_found(client_id)),
            Err(e) => return Err(e.into()),
        };
        debug!(client_id, command_id = id, "command queued");
        Ok(id)
    }

    pub async fn list_commands_for_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Command>, RelayError> {
        // An unknown client and a client with no commands must not look alike.
        self.get_client(client_id).await?;
        Ok(self.db.list_commands_for_client(client_id).await?)
    }

    pub async fn get_command(&self, id: CommandId) -> Result<Command, RelayError> {
        self.db
            .get_command(id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("command {id} not found")))
    }

    /// Take the right to deliver a queued command. Only one caller wins.
    pub async fn claim_command(&self, id: CommandId) -> Result<bool, RelayError> {
        Ok(self.db.claim_command(id).await?)
    }

    /// Record the outcome of a delivery attempt.
    ///
    /// Only `queued` commands move; returns `false` if the command was already
    /// terminal (or is gone).
    pub async fn complete_command(
        &self,
        id: CommandId,
        status: CommandStatus,
        result: Option<&str>,
    ) -> Result<bool, RelayError> {
        if !status.is_terminal() {
            return Err(RelayError::Validation(format!("{status} is not a terminal status")));
        }
        Ok(self.db.complete_command(id, status, result).await?)
    }
}

fn client_not_found(id: ClientId) -> RelayError {
    RelayError::NotFound(format!("client {id} not found"))
}

/// Wrap bare IPv6 literals in brackets so they can carry a port.
fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}

/// Join a host and port into the `host:port` form stored for a client.
pub fn join_host_port(host: &str, port: u16) -> String {
    format!("{}:{port}", bracket_host(host.trim()))
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
