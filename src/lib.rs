// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Group Sync
//!
//! Server-side core for replicating opaque change messages between the
//! devices of a sync group.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator                        │
//! │  • sync(messages, since, group) → (trie, new messages)      │
//! │  • Per-group lock, one transaction per call                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (GroupAddressing)
//!                              ▼
//! ┌────────────────────────────┬────────────────────────────────┐
//! │  FileAddressing            │  SharedAddressing              │
//! │  group-<id>.sqlite         │  PostgreSQL, rows by group_id  │
//! └────────────────────────────┴────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  MessageLog (append-only)   │  MerkleStateStore (JSON trie) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use group_sync::{MessageEnvelope, MinuteTrie, SyncCoordinator, SyncServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), group_sync::SyncError> {
//!     let config = SyncServerConfig::default().with_env_overrides()?;
//!     let coordinator = SyncCoordinator::from_config(&config, MinuteTrie::new()).await?;
//!
//!     let incoming = vec![MessageEnvelope::plain(
//!         "2024-01-01T00:00:00.000Z-0000-0123456789abcdef",
//!         b"opaque change".to_vec(),
//!     )];
//!     let result = coordinator.sync(&incoming, "", "budget-1").await?;
//!     println!("{} messages for the client", result.new_messages.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`SyncCoordinator`] entry point and group locks
//! - [`addressing`]: group id to storage handle
//! - [`storage`]: SQLite and PostgreSQL backends behind [`StorageBackend`]
//! - [`message_log`]: idempotent append and range reads
//! - [`merkle`]: trie algebra, default [`MinuteTrie`], persisted state
//! - [`config`]: [`SyncServerConfig`]

pub mod addressing;
pub mod config;
pub mod coordinator;
pub mod envelope;
pub mod error;
pub mod merkle;
pub mod message_log;
pub mod metrics;
pub mod resilience;
pub mod schema;
pub mod storage;

pub use addressing::{FileAddressing, GroupAddressing, SharedAddressing, StorageHandle};
pub use config::{DatabaseType, SyncServerConfig};
pub use coordinator::{GroupLocks, SyncCoordinator, SyncResult, TrieVerification};
pub use envelope::MessageEnvelope;
pub use error::SyncError;
pub use merkle::{MerkleStateStore, MinuteTrie, Timestamp, TrieAlgebra, TrieNode};
pub use message_log::{AppendOutcome, MessageLog};
pub use resilience::retry::RetryConfig;
pub use schema::SchemaLayout;
pub use storage::traits::{StorageBackend, StorageError};
pub use storage::{PostgresBackend, SqliteBackend};
