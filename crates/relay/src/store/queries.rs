// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queries over the `clients` and `commands` tables.

use super::db::{epoch_ms, Database, DatabaseError};
use super::models::{Client, ClientId, Command, CommandId, CommandStatus};

impl Database {
    // -- Clients --------------------------------------------------------------

    /// Insert a client for `address`, or refresh `updated_at` on the existing one.
    ///
    /// Returns the stored row and whether it was newly inserted.
    pub async fn upsert_client(&self, address: &str) -> Result<(Client, bool), DatabaseError> {
        let now = epoch_ms();

        let inserted = sqlx::query(
            "INSERT INTO clients (address, created_at, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(address) DO NOTHING",
        )
        .bind(address)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            sqlx::query("UPDATE clients SET updated_at = ? WHERE address = ?")
                .bind(now)
                .bind(address)
                .execute(self.pool())
                .await?;
        }

        let client = self
            .get_client_by_address(address)
            .await?
            .ok_or_else(|| DatabaseError::Query(format!("client {address} vanished after upsert")))?;
        Ok((client, inserted))
    }

    pub async fn get_client(&self, id: ClientId) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(client)
    }

    pub async fn get_client_by_address(
        &self,
        address: &str,
    ) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE address = ?")
            .bind(address)
            .fetch_optional(self.pool())
            .await?;
        Ok(client)
    }

    /// Clients whose address starts with `prefix`, in id order, at most `limit` rows.
    ///
    /// Compares with `substr` rather than `LIKE` so `%` and `_` in the prefix
    /// are matched literally and case is significant.
    pub async fn find_clients_by_address_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<Client>, DatabaseError> {
        let clients = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE substr(address, 1, length(?)) = ? ORDER BY id LIMIT ?",
        )
        .bind(prefix)
        .bind(prefix)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(clients)
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>, DatabaseError> {
        let clients = sqlx::query_as::<_, Client>("SELECT * FROM clients ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        Ok(clients)
    }

    pub async fn count_clients(&self) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients")
            .fetch_one(self.pool())
            .await?;
        Ok(count.0)
    }

    /// Delete a client; its commands go with it.
    pub async fn delete_client(&self, id: ClientId) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Commands -------------------------------------------------------------

    /// Insert a `queued` command. Fails with [`DatabaseError::ForeignKey`]
    /// when `client_id` does not exist.
    pub async fn insert_command(
        &self,
        client_id: ClientId,
        text: &str,
    ) -> Result<CommandId, DatabaseError> {
        let now = epoch_ms();

        let result = sqlx::query(
            "INSERT INTO commands (client_id, text, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(client_id)
        .bind(text)
        .bind(CommandStatus::Queued.as_str())
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_command(&self, id: CommandId) -> Result<Option<Command>, DatabaseError> {
        let command = sqlx::query_as::<_, Command>("SELECT * FROM commands WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(command)
    }

    pub async fn list_commands_for_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Command>, DatabaseError> {
        let commands = sqlx::query_as::<_, Command>(
            "SELECT * FROM commands WHERE client_id = ? ORDER BY id",
        )
        .bind(client_id)
        .fetch_all(self.pool())
        .await?;
        Ok(commands)
    }

    /// Claim a `queued` command for delivery.
    ///
    /// Returns `false` when the command is missing, terminal, or already
    /// claimed. At most one caller ever gets `true` for a given command.
    pub async fn claim_command(&self, id: CommandId) -> Result<bool, DatabaseError> {
        let now = epoch_ms();
        let claimed = sqlx::query(
            "UPDATE commands SET claimed_at = ?, updated_at = ? \
             WHERE id = ? AND status = ? AND claimed_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(CommandStatus::Queued.as_str())
        .execute(self.pool())
        .await?;
        Ok(claimed.rows_affected() > 0)
    }

    /// Move a `queued` command to a terminal status.
    ///
    /// Returns `false` without writing when the command is missing or already
    /// terminal.
    pub async fn complete_command(
        &self,
        id: CommandId,
        status: CommandStatus,
        result: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let updated = sqlx::query(
            "UPDATE commands SET status = ?, result = ?, updated_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(result)
        .bind(epoch_ms())
        .bind(id)
        .bind(CommandStatus::Queued.as_str())
        .execute(self.pool())
        .await?;
        Ok(updated.rows_affected() > 0)
    }
}
