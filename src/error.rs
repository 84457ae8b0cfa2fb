// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::storage::traits::StorageError;

/// Errors surfaced by a sync call.
///
/// Duplicate messages are never an error; they are reported as not inserted.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid group id '{0}'")]
    InvalidGroupId(String),
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidGroupId(_) => "invalid_group_id",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::Storage(err) => err.kind(),
            Self::Config(_) => "config",
        }
    }
}
