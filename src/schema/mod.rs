// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Group schema layouts.
//!
//! The logical schema is the same on both backends: a message table with a
//! unique timestamp per group, and one merkle row per group. What differs is
//! how a group is addressed:
//!
//! - **Dedicated**: one database per group, no group column. The merkle row
//!   is keyed by the constant id `1`.
//! - **Partitioned**: one shared database, every row carries `group_id` and
//!   uniqueness is `(group_id, timestamp)`.
//!
//! Statement text for each layout lives here so the message log and merkle
//! store stay layout-agnostic. All statements use `?` placeholders; when the
//! layout is partitioned, `group_id` is always the first parameter (see
//! [`SchemaLayout::scoped`]).
//!
//! ```rust
//! use group_sync::schema::SchemaLayout;
//!
//! let params = SchemaLayout::Partitioned.scoped("budget-1", vec!["T0".into()]);
//! assert_eq!(params.len(), 2);
//!
//! let params = SchemaLayout::Dedicated.scoped("budget-1", vec!["T0".into()]);
//! assert_eq!(params.len(), 1);
//! ```

use crate::storage::traits::SqlValue;

/// Group schema applied to a freshly created per-group SQLite file.
pub const DEDICATED_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS messages_binary (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL UNIQUE,
    is_encrypted INTEGER NOT NULL DEFAULT 0,
    content BLOB
);
CREATE TABLE IF NOT EXISTS messages_merkles (
    id INTEGER PRIMARY KEY,
    merkle TEXT NOT NULL
)
"#;

/// Shared schema, applied once when the shared backend is set up.
///
/// `COLLATE "C"` keeps `timestamp` comparisons byte-ordered regardless of
/// the database's default locale.
pub const PARTITIONED_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS messages_binary (
    id BIGSERIAL PRIMARY KEY,
    group_id TEXT NOT NULL,
    timestamp TEXT COLLATE "C" NOT NULL,
    is_encrypted INTEGER NOT NULL DEFAULT 0,
    content BYTEA,
    UNIQUE (group_id, timestamp)
);
CREATE TABLE IF NOT EXISTS messages_merkles (
    group_id TEXT PRIMARY KEY,
    merkle TEXT NOT NULL
)
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaLayout {
    Dedicated,
    Partitioned,
}

impl SchemaLayout {
    pub fn ddl(self) -> &'static str {
        match self {
            Self::Dedicated => DEDICATED_DDL,
            Self::Partitioned => PARTITIONED_DDL,
        }
    }

    /// Prefix `params` with the group id when rows are partitioned.
    pub fn scoped(self, group_id: &str, params: Vec<SqlValue>) -> Vec<SqlValue> {
        match self {
            Self::Dedicated => params,
            Self::Partitioned => {
                let mut scoped = Vec::with_capacity(params.len() + 1);
                scoped.push(SqlValue::from(group_id));
                scoped.extend(params);
                scoped
            }
        }
    }

    /// Params: timestamp, is_encrypted, content.
    pub(crate) fn insert_message_sql(self) -> &'static str {
        match self {
            Self::Dedicated => {
                "INSERT INTO messages_binary (timestamp, is_encrypted, content) \
                 VALUES (?, ?, ?) ON CONFLICT (timestamp) DO NOTHING"
            }
            Self::Partitioned => {
                "INSERT INTO messages_binary (group_id, timestamp, is_encrypted, content) \
                 VALUES (?, ?, ?, ?) ON CONFLICT (group_id, timestamp) DO NOTHING"
            }
        }
    }

    /// Params: since.
    pub(crate) fn list_since_sql(self) -> &'static str {
        match self {
            Self::Dedicated => {
                "SELECT timestamp, is_encrypted, content FROM messages_binary \
                 WHERE timestamp > ? ORDER BY timestamp"
            }
            Self::Partitioned => {
                "SELECT timestamp, is_encrypted, content FROM messages_binary \
                 WHERE group_id = ? AND timestamp > ? ORDER BY timestamp"
            }
        }
    }

    pub(crate) fn list_timestamps_sql(self) -> &'static str {
        match self {
            Self::Dedicated => "SELECT timestamp FROM messages_binary ORDER BY timestamp",
            Self::Partitioned => {
                "SELECT timestamp FROM messages_binary WHERE group_id = ? ORDER BY timestamp"
            }
        }
    }

    pub(crate) fn count_messages_sql(self) -> &'static str {
        match self {
            Self::Dedicated => "SELECT COUNT(*) AS cnt FROM messages_binary",
            Self::Partitioned => "SELECT COUNT(*) AS cnt FROM messages_binary WHERE group_id = ?",
        }
    }

    pub(crate) fn load_merkle_sql(self) -> &'static str {
        match self {
            Self::Dedicated => "SELECT merkle FROM messages_merkles WHERE id = 1",
            Self::Partitioned => "SELECT merkle FROM messages_merkles WHERE group_id = ?",
        }
    }

    /// Params: serialized trie.
    pub(crate) fn save_merkle_sql(self) -> &'static str {
        match self {
            Self::Dedicated => {
                "INSERT INTO messages_merkles (id, merkle) VALUES (1, ?) \
                 ON CONFLICT (id) DO UPDATE SET merkle = excluded.merkle"
            }
            Self::Partitioned => {
                "INSERT INTO messages_merkles (group_id, merkle) VALUES (?, ?) \
                 ON CONFLICT (group_id) DO UPDATE SET merkle = excluded.merkle"
            }
        }
    }

    /// Transaction-scoped lock serializing merkle read-modify-write for one
    /// group across processes. Dedicated files are only written by the
    /// process holding the in-memory group lock, so they need none.
    pub(crate) fn lock_group_sql(self) -> Option<&'static str> {
        match self {
            Self::Dedicated => None,
            // pg_advisory_xact_lock returns void, which the Any driver cannot decode
            Self::Partitioned => {
                Some("SELECT 1 AS locked FROM (SELECT pg_advisory_xact_lock(hashtext(?))) AS group_lock")
            }
        }
    }
}
