// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

pub type ClientId = i64;
pub type CommandId = i64;

/// A registered agent and the address its command endpoint listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: ClientId,
    /// `host:port`, opaque to the registry.
    pub address: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A command addressed to one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Command {
    pub id: CommandId,
    pub client_id: ClientId,
    pub text: String,
    #[sqlx(try_from = "String")]
    pub status: CommandStatus,
    pub result: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Delivery state of a command.
///
/// `Queued` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Queued,
    Delivered,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown command status: {0:?}")]
pub struct UnknownStatus(String);

impl TryFrom<String> for CommandStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "queued" => Ok(Self::Queued),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownStatus(value)),
        }
    }
}
