// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Hybrid logical clock timestamps.
//!
//! Wire form: `2024-01-01T00:00:00.000Z-0000-0123456789abcdef`
//! (millisecond ISO time, 4-digit hex counter, 16-char node id).
//! Canonical strings sort in the same order as the timestamps they encode.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

const MAX_COUNTER: u32 = 0xFFFF;
const NODE_LEN: usize = 16;
/// 9999-12-31T23:59:59.999Z, the last instant with a 4-digit year.
const MAX_MILLIS: i64 = 253_402_300_799_999;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    time: DateTime<Utc>,
    counter: u16,
    node: String,
}

impl Timestamp {
    /// Build from parts. Returns `None` for millis outside years 1970..=9999
    /// or a node longer than 16 characters. Short nodes are left-padded with
    /// `0`, as in the wire form.
    pub fn new(millis: i64, counter: u16, node: impl Into<String>) -> Option<Self> {
        let node = node.into();
        let len = node.chars().count();
        if !(0..=MAX_MILLIS).contains(&millis) || len > NODE_LEN {
            return None;
        }
        let time = DateTime::<Utc>::from_timestamp_millis(millis)?;
        let node = format!("{}{}", "0".repeat(NODE_LEN - len), node);
        Some(Self { time, counter, node })
    }

    /// Parse the wire form. `None` if any part is malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.split('-').collect();
        if parts.len() != 5 {
            return None;
        }
        let iso = parts[..3].join("-");
        let millis = DateTime::parse_from_rfc3339(&iso).ok()?.timestamp_millis();

        let counter = u32::from_str_radix(parts[3], 16).ok()?;
        if counter > MAX_COUNTER {
            return None;
        }
        Self::new(millis, counter as u16, parts[4])
    }

    pub fn millis(&self) -> i64 {
        self.time.timestamp_millis()
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Node id, padded to 16 characters.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// MurmurHash3 of the canonical string, as a signed 32-bit value.
    pub fn hash(&self) -> i32 {
        murmur3_32(self.to_string().as_bytes(), 0) as i32
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:04X}-{}",
            self.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.counter,
            self.node
        )
    }
}

/// MurmurHash3, x86 32-bit variant.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let mut k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k |= u32::from(*byte) << (8 * i);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
