// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Embedded single-file backend: one SQLite database per sync group.
//!
//! The pool is opened for the duration of one sync call and closed when the
//! owning handle is released. A single connection is used so that the open
//! transaction is the only writer on the file from this process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::debug;

use super::sql::{self, AnyUnit, Placeholders};
use super::traits::{AtomicUnit, MutateResult, SqlRow, SqlValue, StorageBackend, StorageError};

pub struct SqliteBackend {
    pool: AnyPool,
    location: String,
}

impl SqliteBackend {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let url = format!("sqlite://{}?mode=rwc", url_path(path));
        Self::connect(&url, path.display().to_string()).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::connect("sqlite::memory:", ":memory:".to_string()).await
    }

    async fn connect(url: &str, location: String) -> Result<Self, StorageError> {
        sql::install_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to open {}: {}", location, e)))?;

        debug!(location = %location, "SQLite group database opened");
        Ok(Self { pool, location })
    }

    /// Switch the file to WAL journaling. A no-op when already in WAL mode.
    pub async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query::<sqlx::Any>("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        Ok(())
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self) -> Option<PathBuf> {
        (self.location != ":memory:").then(|| PathBuf::from(&self.location))
    }
}

/// Percent-encode a file path for a `sqlite://` URL.
///
/// sqlx percent-decodes the path and cuts it at the first `?`, so every byte
/// outside the unreserved set (and `/`) is escaped.
pub(crate) fn url_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~' | b'/') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, StorageError> {
        sql::pool_query(&self.pool, Placeholders::Positional, sql, params).await
    }

    async fn mutate(&self, sql: &str, params: &[SqlValue]) -> Result<MutateResult, StorageError> {
        sql::pool_mutate(&self.pool, Placeholders::Positional, sql, params).await
    }

    async fn exec_raw(&self, ddl: &str) -> Result<(), StorageError> {
        sql::pool_exec_raw(&self.pool, ddl).await
    }

    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, StorageError> {
        Ok(Box::new(AnyUnit::begin(&self.pool, Placeholders::Positional).await?))
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!(location = %self.location, "SQLite group database closed");
    }
}
