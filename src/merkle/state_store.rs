// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persisted merkle state, one JSON row per group.
//!
//! # Schema
//!
//! ```sql
//! -- per-group file
//! CREATE TABLE messages_merkles (id INTEGER PRIMARY KEY, merkle TEXT NOT NULL);
//! -- shared database
//! CREATE TABLE messages_merkles (group_id TEXT PRIMARY KEY, merkle TEXT NOT NULL);
//! ```
//!
//! Both operations run on the caller's open transaction so the trie update
//! commits or rolls back together with the message inserts.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::schema::SchemaLayout;
use crate::storage::traits::{SqlExecutor, SqlValue, StorageError};

#[derive(Debug, Clone, Copy)]
pub struct MerkleStateStore {
    layout: SchemaLayout,
}

impl MerkleStateStore {
    pub fn new(layout: SchemaLayout) -> Self {
        Self { layout }
    }

    /// Load the stored trie. `None` if the group has never saved one.
    ///
    /// A stored value that does not decode is an error, never a reset.
    #[instrument(skip(self, tx), fields(layout = ?self.layout))]
    pub async fn load<T, E>(&self, tx: &mut E, group_id: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned,
        E: SqlExecutor + ?Sized,
    {
        let params = self.layout.scoped(group_id, Vec::new());
        let Some(row) = tx.query_one(self.layout.load_merkle_sql(), &params).await? else {
            return Ok(None);
        };

        let raw = row.text("merkle")?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::MalformedMerkle {
                group_id: group_id.to_string(),
                reason: e.to_string(),
            })
    }

    /// Upsert the trie for `group_id`.
    #[instrument(skip(self, tx, trie), fields(layout = ?self.layout))]
    pub async fn save<T, E>(&self, tx: &mut E, group_id: &str, trie: &T) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
        E: SqlExecutor + ?Sized,
    {
        let json = serde_json::to_string(trie)
            .map_err(|e| StorageError::Backend(format!("Failed to serialize merkle: {}", e)))?;
        debug!(bytes = json.len(), "Saving merkle");

        let params = self.layout.scoped(group_id, vec![SqlValue::Text(json)]);
        tx.mutate(self.layout.save_merkle_sql(), &params).await?;
        Ok(())
    }
}
