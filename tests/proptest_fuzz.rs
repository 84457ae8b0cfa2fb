// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for timestamps, the minute trie and sync.
//!
//! Uses proptest to generate random/malformed inputs and verify parsing
//! never panics, the trie algebra obeys its laws, and sync stays idempotent.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;

use group_sync::storage::numbered_placeholders;
use group_sync::{
    FileAddressing, MessageEnvelope, MinuteTrie, SyncCoordinator, Timestamp, TrieAlgebra, TrieNode,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Millis between 1970 and roughly 2100
fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (0i64..4_102_444_800_000, any::<u16>(), "[0-9a-f]{1,16}")
        .prop_map(|(millis, counter, node)| Timestamp::new(millis, counter, node).unwrap())
}

/// Timestamps clustered in a few hours so minute keys share prefixes
fn clustered_timestamps() -> impl Strategy<Value = Vec<Timestamp>> {
    prop::collection::vec(
        (0i64..600, 0u16..4, "[ab]{16}").prop_map(|(minute, counter, node)| {
            Timestamp::new(1_700_000_000_000 + minute * 60_000, counter, node).unwrap()
        }),
        0..40,
    )
}

/// Arbitrary JSON values (including invalid trie structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(4, 64, 10, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
            prop::collection::hash_map("hash|0|1|2|.*", inner, 0..10)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn fold(algebra: &MinuteTrie, stamps: &[Timestamp]) -> TrieNode {
    stamps.iter().fold(algebra.empty(), |t, s| algebra.insert(t, s))
}

// =============================================================================
// Timestamp parsing
// =============================================================================

proptest! {
    /// Parsing should never panic on arbitrary strings
    #[test]
    fn fuzz_timestamp_parse_arbitrary(raw in ".*") {
        let _ = Timestamp::parse(&raw);
    }

    /// Parsing should never panic on near-miss wire strings
    #[test]
    fn fuzz_timestamp_parse_near_miss(raw in "[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9:.]{8,14}Z-[0-9A-Fa-fx]{1,6}-[0-9a-z]{0,20}") {
        let _ = Timestamp::parse(&raw);
    }

    /// The canonical form parses back to the same timestamp
    #[test]
    fn prop_canonical_form_parses(ts in timestamp_strategy()) {
        let raw = ts.to_string();
        prop_assert_eq!(Timestamp::parse(&raw), Some(ts.clone()));
        prop_assert_eq!(raw.len(), 46);
    }

    /// String order and timestamp order agree
    #[test]
    fn prop_string_order_matches(a in timestamp_strategy(), b in timestamp_strategy()) {
        prop_assert_eq!(a.cmp(&b), a.to_string().cmp(&b.to_string()));
    }
}

// =============================================================================
// Trie algebra laws
// =============================================================================

proptest! {
    /// Insertion order doesn't change the trie
    #[test]
    fn prop_insert_commutes(mut stamps in clustered_timestamps(), seed in any::<u64>()) {
        let algebra = MinuteTrie::new();
        let forward = fold(&algebra, &stamps);

        let len = stamps.len().max(1);
        stamps.rotate_left((seed as usize) % len);
        stamps.reverse();
        prop_assert_eq!(fold(&algebra, &stamps), forward);
    }

    /// Pruning keeps the root hash and is idempotent
    #[test]
    fn prop_prune_idempotent(stamps in clustered_timestamps()) {
        let algebra = MinuteTrie::new();
        let trie = fold(&algebra, &stamps);
        let once = algebra.prune(trie.clone());
        prop_assert_eq!(once.hash(), trie.hash());
        prop_assert_eq!(algebra.prune(once.clone()), once);
    }

    /// Pruning after every batch equals pruning a full rebuild
    #[test]
    fn prop_batched_prune_matches_rebuild(stamps in clustered_timestamps(), split in 1usize..6) {
        let algebra = MinuteTrie::new();
        let unique: Vec<Timestamp> = stamps.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        let incremental = unique
            .chunks(split)
            .fold(algebra.empty(), |t, chunk| algebra.prune(chunk.iter().fold(t, |t, s| algebra.insert(t, s))));
        prop_assert_eq!(incremental, algebra.prune(fold(&algebra, &unique)));
    }

    /// Trie JSON survives a trip through the wire format
    #[test]
    fn prop_trie_json_lossless(stamps in clustered_timestamps()) {
        let algebra = MinuteTrie::new();
        let trie = algebra.prune(fold(&algebra, &stamps));
        let json = serde_json::to_string(&trie).unwrap();
        prop_assert_eq!(serde_json::from_str::<TrieNode>(&json).unwrap(), trie);
    }

    /// Trie deserialization should handle arbitrary JSON gracefully
    #[test]
    fn fuzz_trie_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let _ = serde_json::from_value::<TrieNode>(json);
    }
}

// =============================================================================
// Placeholder rewriting
// =============================================================================

proptest! {
    /// Every `?` outside quotes becomes one numbered placeholder, in order
    #[test]
    fn prop_placeholders_numbered_in_order(parts in prop::collection::vec("[a-z =,()]{0,8}", 1..8)) {
        let sql = parts.join("?");
        let rewritten = numbered_placeholders(&sql);
        prop_assert!(!rewritten.contains('?'));
        for n in 1..parts.len() {
            let placeholder = format!("${}", n);
            prop_assert!(rewritten.contains(&placeholder));
        }
    }

    /// `?` inside a single-quoted literal is left alone
    #[test]
    fn prop_quoted_question_marks_untouched(literal in "[a-z?]{0,10}") {
        let sql = format!("SELECT '{}' WHERE a = ?", literal);
        let rewritten = numbered_placeholders(&sql);
        prop_assert_eq!(rewritten.as_ref(), format!("SELECT '{}' WHERE a = $1", literal));
    }
}

// =============================================================================
// Sync properties over random batches
// =============================================================================

fn batch_strategy() -> impl Strategy<Value = Vec<MessageEnvelope>> {
    prop::collection::vec(
        (0i64..120, 0u16..3, any::<bool>(), prop::collection::vec(any::<u8>(), 0..32)),
        0..12,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(minute, counter, encrypted, content)| {
                let ts = Timestamp::new(1_700_000_000_000 + minute * 60_000, counter, "0123456789abcdef")
                    .unwrap();
                MessageEnvelope::new(ts.to_string(), encrypted, content)
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Replaying batches changes nothing; no call echoes its own messages;
    /// the stored trie always matches a rebuild.
    #[test]
    fn prop_sync_idempotent_no_echo(batches in prop::collection::vec(batch_strategy(), 1..4)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let coordinator =
                SyncCoordinator::new(Arc::new(FileAddressing::new(dir.path())), MinuteTrie::new());

            let mut stored = BTreeSet::new();
            for batch in &batches {
                let since = batch.iter().map(|m| m.timestamp.clone()).min().unwrap_or_default();
                let result = coordinator.sync(batch, &since, "fuzz").await.unwrap();

                // Returned rows were all stored before this call
                for msg in &result.new_messages {
                    prop_assert!(stored.contains(&msg.timestamp));
                    prop_assert!(msg.timestamp > since);
                }
                stored.extend(batch.iter().map(|m| m.timestamp.clone()));
            }

            let before = coordinator.merkle("fuzz").await.unwrap();
            for batch in &batches {
                coordinator.sync(batch, "", "fuzz").await.unwrap();
            }
            prop_assert_eq!(coordinator.merkle("fuzz").await.unwrap(), before);

            let verification = coordinator.verify_group("fuzz").await.unwrap();
            prop_assert!(verification.consistent);
            prop_assert_eq!(verification.message_count, stored.len() as u64);
            Ok(())
        })?;
    }
}
