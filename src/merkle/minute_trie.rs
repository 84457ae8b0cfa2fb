// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Minute-keyed base-3 merkle trie.
//!
//! A timestamp's key is its minute (`millis / 60000`) written in base 3, so
//! the trie has at most three children per node and lexicographic key order
//! equals time order. Each node's hash is the XOR of the hashes of every
//! timestamp stored beneath it.
//!
//! ```text
//! root (h1 ^ h2 ^ h3)
//! ├── "1" (h1 ^ h2)
//! │   └── …
//! └── "2" (h3)
//!     └── …
//! ```
//!
//! Serialized as nested JSON objects: `{"hash": -123, "1": {…}, "2": {…}}`.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::timestamp::Timestamp;
use super::TrieAlgebra;

/// Children kept per node by [`MinuteTrie`] pruning.
const DEFAULT_KEEP: usize = 2;

/// A node of the minute trie. The root is itself a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrieNode {
    hash: Option<i32>,
    children: BTreeMap<char, TrieNode>,
}

impl TrieNode {
    /// XOR of every timestamp hash below this node; 0 when empty.
    pub fn hash(&self) -> i32 {
        self.hash.unwrap_or(0)
    }

    pub fn child(&self, branch: char) -> Option<&TrieNode> {
        self.children.get(&branch)
    }

    /// Branch labels in ascending order.
    pub fn branches(&self) -> impl Iterator<Item = char> + '_ {
        self.children.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_none() && self.children.is_empty()
    }

    fn fold(&mut self, hash: i32) {
        self.hash = Some(self.hash() ^ hash);
    }
}

impl Serialize for TrieNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.children.len() + usize::from(self.hash.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(hash) = self.hash {
            map.serialize_entry("hash", &hash)?;
        }
        for (branch, child) in &self.children {
            map.serialize_entry(&branch.to_string(), child)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TrieNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = TrieNode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a merkle trie node object")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<TrieNode, M::Error> {
        let mut node = TrieNode::default();
        while let Some(key) = map.next_key::<String>()? {
            if key == "hash" {
                node.hash = map.next_value::<Option<i32>>()?;
                continue;
            }
            let branch = match key.as_str() {
                "0" => '0',
                "1" => '1',
                "2" => '2',
                other => return Err(de::Error::custom(format!("invalid trie branch '{}'", other))),
            };
            node.children.insert(branch, map.next_value()?);
        }
        Ok(node)
    }
}

/// Base-3 rendering of the minute containing `millis`.
pub(crate) fn minute_key(millis: i64) -> String {
    let mut minutes = millis.max(0) / 60_000;
    if minutes == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while minutes > 0 {
        // Digit is always 0..=2
        digits.push(char::from(b'0' + (minutes % 3) as u8));
        minutes /= 3;
    }
    digits.iter().rev().collect()
}

fn prune_node(node: TrieNode, keep: usize) -> TrieNode {
    if node.hash() == 0 {
        return node;
    }
    let TrieNode { hash, children } = node;
    let skip = children.len().saturating_sub(keep);
    let children = children
        .into_iter()
        .skip(skip)
        .map(|(branch, child)| (branch, prune_node(child, keep)))
        .collect();
    TrieNode { hash, children }
}

/// The default trie algebra: [`Timestamp`] keys in a [`TrieNode`] trie.
#[derive(Debug, Clone, Copy)]
pub struct MinuteTrie {
    keep: usize,
}

impl Default for MinuteTrie {
    fn default() -> Self {
        Self { keep: DEFAULT_KEEP }
    }
}

impl MinuteTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `keep` newest children per node when pruning (minimum 1).
    pub fn with_keep(keep: usize) -> Self {
        Self { keep: keep.max(1) }
    }
}

impl TrieAlgebra for MinuteTrie {
    type Trie = TrieNode;
    type Timestamp = Timestamp;

    fn empty(&self) -> TrieNode {
        TrieNode::default()
    }

    fn parse(&self, raw: &str) -> Option<Timestamp> {
        Timestamp::parse(raw)
    }

    fn insert(&self, mut trie: TrieNode, timestamp: &Timestamp) -> TrieNode {
        let hash = timestamp.hash();
        trie.fold(hash);

        let mut node = &mut trie;
        for branch in minute_key(timestamp.millis()).chars() {
            node = node.children.entry(branch).or_default();
            node.fold(hash);
        }
        trie
    }

    fn prune(&self, trie: TrieNode) -> TrieNode {
        prune_node(trie, self.keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: i64, counter: u16) -> Timestamp {
        Timestamp::new(millis, counter, "0123456789abcdef").unwrap()
    }

    fn depth(node: &TrieNode) -> usize {
        node.branches()
            .filter_map(|b| node.child(b))
            .map(|c| 1 + depth(c))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_minute_key() {
        assert_eq!(minute_key(0), "0");
        assert_eq!(minute_key(59_999), "0");
        assert_eq!(minute_key(60_000), "1");
        assert_eq!(minute_key(3 * 60_000), "10");
        assert_eq!(minute_key(8 * 60_000), "22");
    }

    #[test]
    fn test_insert_xors_along_path() {
        let algebra = MinuteTrie::new();
        let t = ts(4 * 60_000, 0); // key "11"
        let trie = algebra.insert(algebra.empty(), &t);

        assert_eq!(trie.hash(), t.hash());
        let one = trie.child('1').unwrap();
        assert_eq!(one.hash(), t.hash());
        assert_eq!(one.child('1').unwrap().hash(), t.hash());
        assert_eq!(depth(&trie), 2);
    }

    #[test]
    fn test_insert_is_order_independent() {
        let algebra = MinuteTrie::new();
        let stamps = [ts(60_000, 0), ts(120_000, 3), ts(5 * 60_000, 1)];

        let forward = stamps.iter().fold(algebra.empty(), |t, s| algebra.insert(t, s));
        let backward = stamps.iter().rev().fold(algebra.empty(), |t, s| algebra.insert(t, s));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_double_insert_cancels_hash() {
        let algebra = MinuteTrie::new();
        let t = ts(60_000, 0);
        let trie = algebra.insert(algebra.insert(algebra.empty(), &t), &t);
        assert_eq!(trie.hash(), 0);
    }

    #[test]
    fn test_prune_keeps_newest_children() {
        let algebra = MinuteTrie::new();
        // Keys "0", "1", "2" under the root
        let trie = [ts(0, 0), ts(60_000, 0), ts(120_000, 0)]
            .iter()
            .fold(algebra.empty(), |t, s| algebra.insert(t, s));
        assert_eq!(trie.branches().count(), 3);

        let pruned = algebra.prune(trie.clone());
        assert_eq!(pruned.branches().collect::<Vec<_>>(), vec!['1', '2']);
        assert_eq!(pruned.hash(), trie.hash());
    }

    #[test]
    fn test_prune_leaves_zero_hash_untouched() {
        let algebra = MinuteTrie::new();
        assert_eq!(algebra.prune(algebra.empty()), TrieNode::default());
    }

    #[test]
    fn test_json_shape() {
        let algebra = MinuteTrie::new();
        assert_eq!(serde_json::to_string(&algebra.empty()).unwrap(), "{}");

        let t = ts(60_000, 0);
        let trie = algebra.insert(algebra.empty(), &t);
        let json = serde_json::to_value(&trie).unwrap();
        assert_eq!(json["hash"], t.hash());
        assert_eq!(json["1"]["hash"], t.hash());

        let back: TrieNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, trie);
    }

    #[test]
    fn test_rejects_unknown_branch() {
        assert!(serde_json::from_str::<TrieNode>(r#"{"hash": 1, "7": {}}"#).is_err());
        assert!(serde_json::from_str::<TrieNode>("[1, 2]").is_err());
    }
}
