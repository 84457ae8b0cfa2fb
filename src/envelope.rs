// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Message envelope data structure.
//!
//! The [`MessageEnvelope`] is the unit of replication. The store never looks
//! inside `content`; it only orders and deduplicates by `timestamp`.
//!
//! # Example
//!
//! ```
//! use group_sync::MessageEnvelope;
//!
//! let msg = MessageEnvelope::new("2024-01-01T00:00:00.000Z-0000-0123456789abcdef", false, b"payload".to_vec());
//! assert!(!msg.is_encrypted);
//! assert_eq!(msg.content, b"payload");
//! ```

use serde::{Deserialize, Serialize};

use crate::storage::traits::{SqlRow, StorageError};

/// Timestamp, encryption flag and opaque content of one change message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Logical clock value; unique within a group and totally ordered.
    pub timestamp: String,
    /// Whether `content` is ciphertext.
    #[serde(default)]
    pub is_encrypted: bool,
    /// Opaque payload.
    #[serde(default)]
    pub content: Vec<u8>,
}

impl MessageEnvelope {
    pub fn new(timestamp: impl Into<String>, is_encrypted: bool, content: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp: timestamp.into(),
            is_encrypted,
            content: content.into(),
        }
    }

    /// Unencrypted message.
    pub fn plain(timestamp: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::new(timestamp, false, content)
    }

    pub(crate) fn from_row(row: &SqlRow) -> Result<Self, StorageError> {
        Ok(Self {
            timestamp: row.text("timestamp")?,
            is_encrypted: row.flag("is_encrypted")?,
            content: row.blob("content")?,
        })
    }
}
