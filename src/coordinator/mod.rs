// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator.
//!
//! The [`SyncCoordinator`] is the entry point for a client sync round trip:
//! - resolves the group's storage through a [`GroupAddressing`] strategy
//! - captures the outgoing delta before applying anything (no echo)
//! - appends incoming messages idempotently, folding new ones into the trie
//! - prunes and saves the trie
//!
//! Everything between resolving the handle and releasing it runs in one
//! transaction, under a per-group lock.
//!
//! # Call Flow
//!
//! ```text
//! sync(messages, since, group)
//!   → validate group id, parse every timestamp
//!   → lock group → resolve handle
//!   → BEGIN
//!       [advisory lock]  (shared database only)
//!       outgoing = list_since(since)
//!       trie = load() or empty
//!       for each message: if append_if_new → trie = insert(trie, ts)
//!       trie = prune(trie); save(trie)
//!     COMMIT (ROLLBACK on any error)
//!   → release handle → unlock group
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use group_sync::{MessageEnvelope, MinuteTrie, SyncCoordinator, SyncServerConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), group_sync::SyncError> {
//! let config = SyncServerConfig::default().with_env_overrides()?;
//! let coordinator = SyncCoordinator::from_config(&config, MinuteTrie::new()).await?;
//!
//! let msg = MessageEnvelope::plain("2024-01-01T00:00:00.000Z-0000-0123456789abcdef", b"change".to_vec());
//! let result = coordinator.sync(&[msg], "", "budget-1").await?;
//! assert!(result.new_messages.is_empty());
//! # Ok(())
//! # }
//! ```

mod locks;
mod types;

pub use locks::{GroupGuard, GroupLocks};
pub use types::{SyncResult, TrieVerification};

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::addressing::{self, validate_group_id, GroupAddressing};
use crate::config::SyncServerConfig;
use crate::envelope::MessageEnvelope;
use crate::error::SyncError;
use crate::merkle::{MerkleStateStore, TrieAlgebra};
use crate::message_log::MessageLog;
use crate::metrics;
use crate::schema::SchemaLayout;
use crate::storage::traits::{run_atomic, AtomicUnit, BoxedWork, SqlValue};
use types::BatchCounts;

/// Merges client batches into per-group logs and returns the delta.
pub struct SyncCoordinator<A: TrieAlgebra> {
    addressing: Arc<dyn GroupAddressing>,
    algebra: Arc<A>,
    locks: GroupLocks,
}

impl<A: TrieAlgebra> SyncCoordinator<A> {
    pub fn new(addressing: Arc<dyn GroupAddressing>, algebra: A) -> Self {
        Self {
            addressing,
            algebra: Arc::new(algebra),
            locks: GroupLocks::new(),
        }
    }

    /// Build the addressing strategy from `config` and wrap it.
    pub async fn from_config(config: &SyncServerConfig, algebra: A) -> Result<Self, SyncError> {
        let addressing = addressing::from_config(config).await?;
        Ok(Self::new(addressing, algebra))
    }

    pub fn algebra(&self) -> &A {
        &self.algebra
    }

    pub fn backend_name(&self) -> &'static str {
        self.addressing.backend_name()
    }

    /// Apply `messages` to the group and return what the client is missing.
    ///
    /// The returned messages are those stored before this call with
    /// `timestamp > since`, so the client's own messages are never echoed
    /// back. Retransmitted messages are skipped. On error nothing from the
    /// batch is kept.
    #[instrument(skip(self, messages), fields(backend = self.addressing.backend_name(), incoming = messages.len()))]
    pub async fn sync(
        &self,
        messages: &[MessageEnvelope],
        since: &str,
        group_id: &str,
    ) -> Result<SyncResult<A::Trie>, SyncError> {
        let backend = self.addressing.backend_name();
        let _timer = metrics::CallTimer::new(backend);

        match self.apply_batch(messages, since, group_id).await {
            Ok((result, counts)) => {
                debug!(
                    inserted = counts.inserted,
                    duplicates = counts.duplicates,
                    outgoing = result.new_messages.len(),
                    "Sync applied"
                );
                metrics::record_sync_call(backend, "success");
                metrics::record_messages_applied(counts.inserted, counts.duplicates);
                metrics::record_messages_sent(result.new_messages.len());
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Sync failed");
                metrics::record_sync_call(backend, "error");
                metrics::record_error("sync", e.kind());
                Err(e)
            }
        }
    }

    async fn apply_batch(
        &self,
        messages: &[MessageEnvelope],
        since: &str,
        group_id: &str,
    ) -> Result<(SyncResult<A::Trie>, BatchCounts), SyncError> {
        validate_group_id(group_id)?;
        let stamps = messages
            .iter()
            .map(|m| {
                self.algebra
                    .parse(&m.timestamp)
                    .ok_or_else(|| SyncError::InvalidTimestamp(m.timestamp.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let algebra = Arc::clone(&self.algebra);
        let messages = messages.to_vec();
        let since = since.to_string();
        let group = group_id.to_string();

        self.with_group(group_id, move |tx, layout| {
            Box::pin(async move {
                let log = MessageLog::new(layout);
                let store = MerkleStateStore::new(layout);

                let new_messages = log.list_since(&mut *tx, &group, &since).await?;

                let mut trie = store
                    .load::<A::Trie, _>(&mut *tx, &group)
                    .await?
                    .unwrap_or_else(|| algebra.empty());

                let mut counts = BatchCounts::default();
                for (message, stamp) in messages.iter().zip(&stamps) {
                    if log.append_if_new(&mut *tx, &group, message).await?.inserted {
                        trie = algebra.insert(trie, stamp);
                        counts.inserted += 1;
                    } else {
                        counts.duplicates += 1;
                    }
                }

                let trie = algebra.prune(trie);
                store.save(&mut *tx, &group, &trie).await?;

                Ok::<_, SyncError>((SyncResult { trie, new_messages }, counts))
            })
        })
        .await
    }

    /// The stored trie for `group_id`, or the empty trie.
    #[instrument(skip(self))]
    pub async fn merkle(&self, group_id: &str) -> Result<A::Trie, SyncError> {
        let algebra = Arc::clone(&self.algebra);
        let group = group_id.to_string();

        self.with_group(group_id, move |tx, layout| {
            Box::pin(async move {
                let stored = MerkleStateStore::new(layout)
                    .load::<A::Trie, _>(&mut *tx, &group)
                    .await?;
                Ok::<_, SyncError>(stored.unwrap_or_else(|| algebra.empty()))
            })
        })
        .await
    }

    /// Rebuild the trie from every stored timestamp and compare it with the
    /// persisted one. Read-only.
    #[instrument(skip(self))]
    pub async fn verify_group(&self, group_id: &str) -> Result<TrieVerification<A::Trie>, SyncError> {
        let algebra = Arc::clone(&self.algebra);
        let group = group_id.to_string();

        let verification = self
            .with_group(group_id, move |tx, layout| {
                Box::pin(async move {
                    let log = MessageLog::new(layout);
                    let stored = MerkleStateStore::new(layout)
                        .load::<A::Trie, _>(&mut *tx, &group)
                        .await?
                        .unwrap_or_else(|| algebra.empty());

                    let mut rebuilt = algebra.empty();
                    for raw in log.list_all_timestamps(&mut *tx, &group).await? {
                        let stamp = algebra
                            .parse(&raw)
                            .ok_or_else(|| SyncError::InvalidTimestamp(raw.clone()))?;
                        rebuilt = algebra.insert(rebuilt, &stamp);
                    }
                    let rebuilt = algebra.prune(rebuilt);
                    let message_count = log.count(&mut *tx, &group).await?;

                    Ok::<_, SyncError>(TrieVerification {
                        consistent: stored == rebuilt,
                        stored,
                        rebuilt,
                        message_count,
                    })
                })
            })
            .await;

        match &verification {
            Ok(v) if !v.consistent => {
                warn!(message_count = v.message_count, "Stored trie does not match message log");
            }
            Err(e) => metrics::record_error("verify", e.kind()),
            Ok(_) => {}
        }
        verification
    }

    /// Run `work` for one group: lock, resolve, one transaction, release.
    async fn with_group<T, F>(&self, group_id: &str, work: F) -> Result<T, SyncError>
    where
        F: for<'t> FnOnce(&'t mut (dyn AtomicUnit + 'static), SchemaLayout) -> BoxedWork<'t, T, SyncError>
            + Send
            + 'static,
        T: Send + 'static,
    {
        validate_group_id(group_id)?;
        let _guard = self.locks.acquire(group_id).await;

        let handle = self.addressing.resolve_handle(group_id).await.inspect_err(|e| {
            metrics::record_error("resolve", e.kind());
        })?;
        let layout = handle.layout();
        let lock_key = group_id.to_string();

        let outcome = run_atomic::<_, SyncError, _>(handle.backend(), move |tx| {
            Box::pin(async move {
                if let Some(lock_sql) = layout.lock_group_sql() {
                    tx.query(lock_sql, &[SqlValue::Text(lock_key)]).await?;
                }
                work(tx, layout).await
            })
        })
        .await;

        handle.release().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::FileAddressing;
    use crate::merkle::{MinuteTrie, Timestamp};

    fn coordinator(dir: &std::path::Path) -> SyncCoordinator<MinuteTrie> {
        SyncCoordinator::new(Arc::new(FileAddressing::new(dir)), MinuteTrie::new())
    }

    fn msg(minute: i64, counter: u16, body: &str) -> MessageEnvelope {
        let ts = Timestamp::new(minute * 60_000, counter, "0123456789abcdef").unwrap();
        MessageEnvelope::plain(ts.to_string(), body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_first_sync_creates_group() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());

        let result = coordinator.sync(&[msg(1, 0, "a")], "", "g1").await.unwrap();
        assert!(result.new_messages.is_empty());
        assert_ne!(result.trie.hash(), 0);
        assert!(dir.path().join("group-g1.sqlite").exists());
        assert_eq!(coordinator.merkle("g1").await.unwrap(), result.trie);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_everything_since() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let batch = [msg(1, 0, "a"), msg(2, 0, "b")];
        coordinator.sync(&batch, "", "g1").await.unwrap();

        let result = coordinator.sync(&[], "", "g1").await.unwrap();
        assert_eq!(result.new_messages, batch.to_vec());

        let result = coordinator.sync(&[], &batch[0].timestamp, "g1").await.unwrap();
        assert_eq!(result.new_messages, vec![batch[1].clone()]);
    }

    #[tokio::test]
    async fn test_invalid_inputs_touch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());

        let err = coordinator.sync(&[msg(1, 0, "a")], "", "../evil").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidGroupId(_)));

        let bad = MessageEnvelope::plain("not-a-timestamp", b"x".to_vec());
        let err = coordinator.sync(&[msg(1, 0, "a"), bad], "", "g1").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidTimestamp(ref t) if t == "not-a-timestamp"));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(coordinator.locks.is_empty());
    }

    #[tokio::test]
    async fn test_verify_group() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        coordinator.sync(&[msg(1, 0, "a"), msg(5, 1, "b")], "", "g1").await.unwrap();
        coordinator.sync(&[msg(9, 0, "c"), msg(1, 0, "a")], "", "g1").await.unwrap();

        let verification = coordinator.verify_group("g1").await.unwrap();
        assert!(verification.is_consistent());
        assert_eq!(verification.message_count, 3);
    }
}
