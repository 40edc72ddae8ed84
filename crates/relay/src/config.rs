// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Configuration for the command relay server.
#[derive(Debug, Clone, Parser)]
#[command(name = "cmdrelay", version, about = "Register agents and relay commands to them.")]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CMDRELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "CMDRELAY_PORT")]
    pub port: u16,

    /// Path to the SQLite database file (created if missing).
    #[arg(long, default_value = "cmdrelay.db", env = "CMDRELAY_DATABASE")]
    pub database: PathBuf,

    /// Timeout for one relay to an agent, in milliseconds.
    #[arg(long, default_value_t = 10000, env = "CMDRELAY_DISPATCH_TIMEOUT_MS")]
    pub dispatch_timeout_ms: u64,

    /// Path of the agents' command endpoint.
    #[arg(long, default_value = "/execute", env = "CMDRELAY_AGENT_PATH")]
    pub agent_path: String,

    /// Log format (text or json).
    #[arg(long, default_value = "text", env = "CMDRELAY_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CMDRELAY_LOG_LEVEL")]
    pub log_level: String,
}

impl RelayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch_timeout_ms == 0 {
            anyhow::bail!("--dispatch-timeout-ms must be greater than zero");
        }
        if !self.agent_path.starts_with('/') {
            anyhow::bail!("--agent-path must start with '/': {}", self.agent_path);
        }
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid --log-format: {other} (expected text or json)"),
        }
        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
