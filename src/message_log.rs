// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Append-only, per-group message log ordered by timestamp.
//!
//! Uniqueness of `(group, timestamp)` is enforced by the database, so a
//! retransmitted message is silently skipped instead of stored twice.
//! Messages are never updated or deleted here.

use tracing::{debug, instrument};

use crate::envelope::MessageEnvelope;
use crate::schema::SchemaLayout;
use crate::storage::traits::{SqlExecutor, SqlValue, StorageError};

/// Whether an append stored a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub inserted: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MessageLog {
    layout: SchemaLayout,
}

impl MessageLog {
    pub fn new(layout: SchemaLayout) -> Self {
        Self { layout }
    }

    /// Insert `message` unless its timestamp is already stored for the group.
    #[instrument(skip(self, tx, message), fields(timestamp = %message.timestamp))]
    pub async fn append_if_new<E>(
        &self,
        tx: &mut E,
        group_id: &str,
        message: &MessageEnvelope,
    ) -> Result<AppendOutcome, StorageError>
    where
        E: SqlExecutor + ?Sized,
    {
        let params = self.layout.scoped(
            group_id,
            vec![
                SqlValue::Text(message.timestamp.clone()),
                SqlValue::from(message.is_encrypted),
                SqlValue::Blob(message.content.clone()),
            ],
        );

        match tx.mutate(self.layout.insert_message_sql(), &params).await {
            Ok(result) => Ok(AppendOutcome { inserted: result.changes > 0 }),
            Err(StorageError::UniqueViolation(detail)) => {
                debug!(detail = %detail, "Duplicate timestamp reported by driver");
                Ok(AppendOutcome { inserted: false })
            }
            Err(e) => Err(e),
        }
    }

    /// Messages with `timestamp > since`, ascending.
    #[instrument(skip(self, tx))]
    pub async fn list_since<E>(
        &self,
        tx: &mut E,
        group_id: &str,
        since: &str,
    ) -> Result<Vec<MessageEnvelope>, StorageError>
    where
        E: SqlExecutor + ?Sized,
    {
        let params = self.layout.scoped(group_id, vec![SqlValue::from(since)]);
        let rows = tx.query(self.layout.list_since_sql(), &params).await?;
        rows.iter().map(MessageEnvelope::from_row).collect()
    }

    /// Every stored timestamp for the group, ascending.
    pub async fn list_all_timestamps<E>(
        &self,
        tx: &mut E,
        group_id: &str,
    ) -> Result<Vec<String>, StorageError>
    where
        E: SqlExecutor + ?Sized,
    {
        let params = self.layout.scoped(group_id, Vec::new());
        let rows = tx.query(self.layout.list_timestamps_sql(), &params).await?;
        rows.iter().map(|row| row.text("timestamp")).collect()
    }

    pub async fn count<E>(&self, tx: &mut E, group_id: &str) -> Result<u64, StorageError>
    where
        E: SqlExecutor + ?Sized,
    {
        let params = self.layout.scoped(group_id, Vec::new());
        let count = match tx.query_one(self.layout.count_messages_sql(), &params).await? {
            Some(row) => row.integer("cnt")?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }
}
