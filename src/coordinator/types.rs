// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync coordinator.

use crate::envelope::MessageEnvelope;

/// Result of one sync call.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult<T> {
    /// The group's trie after this call's messages were applied.
    pub trie: T,
    /// Messages stored before this call with `timestamp > since`, ascending.
    pub new_messages: Vec<MessageEnvelope>,
}

/// Stored trie compared against one rebuilt from the message log.
#[derive(Debug, Clone, PartialEq)]
pub struct TrieVerification<T> {
    pub stored: T,
    pub rebuilt: T,
    pub consistent: bool,
    /// Messages in the log when the check ran.
    pub message_count: u64,
}

impl<T> TrieVerification<T> {
    pub fn is_consistent(&self) -> bool {
        self.consistent
    }
}

/// Counts from applying one incoming batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BatchCounts {
    pub inserted: usize,
    pub duplicates: usize,
}
