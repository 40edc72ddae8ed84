// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite persistence for registered clients and their commands.

mod db;
mod models;
mod queries;

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

pub use db::{epoch_ms, Database, DatabaseError};
pub use models::{Client, ClientId, Command, CommandId, CommandStatus, UnknownStatus};
