// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merkle trie over logical timestamps.
//!
//! # Design
//!
//! Each group keeps one trie summarizing every timestamp it has stored.
//! Clients compare their trie with the server's to find the earliest point
//! where the histories diverge, then resync from there.
//!
//! The coordinator never inspects the trie itself. It only needs four
//! operations, captured by [`TrieAlgebra`]:
//!
//! ```text
//! empty()            -> trie with no timestamps
//! parse("…")         -> Some(timestamp) | None
//! insert(trie, &ts)  -> trie with ts folded in
//! prune(trie)        -> trie with old branches dropped
//! ```
//!
//! The default algebra is [`MinuteTrie`]: base-3 minute keys with XOR-folded
//! MurmurHash3 hashes, wire-compatible with existing clients.
//!
//! # Storage
//!
//! Tries are persisted as JSON, one row per group, by [`MerkleStateStore`].

mod minute_trie;
mod state_store;
mod timestamp;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub use minute_trie::{MinuteTrie, TrieNode};
pub use state_store::MerkleStateStore;
pub use timestamp::{murmur3_32, Timestamp};

/// Trie and timestamp operations used by the sync coordinator.
///
/// Implementations must be pure: the same inputs always give the same trie.
pub trait TrieAlgebra: Send + Sync + 'static {
    type Trie: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Timestamp: Send + Sync + 'static;

    fn empty(&self) -> Self::Trie;

    /// Parse a wire timestamp. `None` if it is malformed.
    fn parse(&self, raw: &str) -> Option<Self::Timestamp>;

    fn insert(&self, trie: Self::Trie, timestamp: &Self::Timestamp) -> Self::Trie;

    fn prune(&self, trie: Self::Trie) -> Self::Trie;
}
