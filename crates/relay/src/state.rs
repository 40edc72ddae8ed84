// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::config::RelayConfig;
use crate::dispatch::Dispatcher;
use crate::registry::Registry;
use crate::store::Database;

/// Shared relay state, one per server.
pub struct RelayState {
    pub registry: Registry,
    pub dispatcher: Dispatcher,
}

impl RelayState {
    /// Wire the registry and dispatcher around an already-open database.
    pub fn new(config: &RelayConfig, db: Database) -> Result<Self, reqwest::Error> {
        let registry = Registry::new(db);
        let dispatcher = Dispatcher::new(
            registry.clone(),
            config.dispatch_timeout(),
            config.agent_path.clone(),
        )?;
        Ok(Self { registry, dispatcher })
    }
}
