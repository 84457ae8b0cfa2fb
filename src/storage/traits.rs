// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend-agnostic storage contract.
//!
//! Both engines (per-group SQLite files and the shared PostgreSQL pool)
//! implement [`StorageBackend`]. Statements are written once with the generic
//! `?` placeholder and positional [`SqlValue`] parameters; each backend
//! translates placeholders for its own driver.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Column '{column}' missing or not {expected}")]
    Column {
        column: String,
        expected: &'static str,
    },
    #[error("Malformed merkle state for group '{group_id}': {reason}")]
    MalformedMerkle {
        group_id: String,
        reason: String,
    },
}

impl StorageError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Backend(_) => "backend",
            Self::UniqueViolation(_) => "unique_violation",
            Self::Column { .. } => "column",
            Self::MalformedMerkle { .. } => "malformed_merkle",
        }
    }
}

/// A positional statement parameter or a decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn text(&self, column: &str) -> Result<String, StorageError> {
        match self.get(column) {
            Some(SqlValue::Text(text)) => Ok(text.clone()),
            // Some drivers hand TEXT back as bytes
            Some(SqlValue::Blob(bytes)) => String::from_utf8(bytes.clone())
                .map_err(|_| Self::mismatch(column, "utf-8 text")),
            _ => Err(Self::mismatch(column, "text")),
        }
    }

    pub fn integer(&self, column: &str) -> Result<i64, StorageError> {
        match self.get(column) {
            Some(SqlValue::Integer(value)) => Ok(*value),
            _ => Err(Self::mismatch(column, "an integer")),
        }
    }

    /// Integer column read as a flag; NULL counts as false.
    pub fn flag(&self, column: &str) -> Result<bool, StorageError> {
        match self.get(column) {
            Some(SqlValue::Integer(value)) => Ok(*value != 0),
            Some(SqlValue::Null) => Ok(false),
            _ => Err(Self::mismatch(column, "a flag")),
        }
    }

    /// Blob column; NULL reads as empty content.
    pub fn blob(&self, column: &str) -> Result<Vec<u8>, StorageError> {
        match self.get(column) {
            Some(SqlValue::Blob(bytes)) => Ok(bytes.clone()),
            Some(SqlValue::Text(text)) => Ok(text.clone().into_bytes()),
            Some(SqlValue::Null) => Ok(Vec::new()),
            _ => Err(Self::mismatch(column, "a blob")),
        }
    }

    fn mismatch(column: &str, expected: &'static str) -> StorageError {
        StorageError::Column {
            column: column.to_string(),
            expected,
        }
    }
}

/// Outcome of an INSERT/UPDATE/DELETE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutateResult {
    pub changes: u64,
    /// Rowid of a plain INSERT that changed a row, on SQLite. PostgreSQL
    /// reports none; use `RETURNING` there. An upsert that takes its UPDATE
    /// branch leaves the previous rowid.
    pub last_insert_id: Option<i64>,
}

/// Statement execution on a single connection or open transaction.
#[async_trait]
pub trait SqlExecutor: Send {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, StorageError>;

    async fn query_one(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqlRow>, StorageError> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    async fn mutate(&mut self, sql: &str, params: &[SqlValue]) -> Result<MutateResult, StorageError>;
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait AtomicUnit: SqlExecutor {
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Engine label for logs and metrics ("sqlite", "postgres").
    fn kind(&self) -> &'static str;

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, StorageError>;

    async fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlRow>, StorageError> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    async fn mutate(&self, sql: &str, params: &[SqlValue]) -> Result<MutateResult, StorageError>;

    /// Run semicolon-separated DDL without parameters.
    async fn exec_raw(&self, ddl: &str) -> Result<(), StorageError>;

    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, StorageError>;

    /// Release connections held by this backend. No-op for shared pools.
    async fn close(&self);
}

/// Boxed future returned by a unit of work passed to [`run_atomic`].
pub type BoxedWork<'t, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 't>>;

/// Run `work` inside one transaction.
///
/// Commits when the work returns `Ok`. On `Err` the transaction is rolled
/// back and the work's error is returned unchanged.
pub async fn run_atomic<T, E, F>(backend: &dyn StorageBackend, work: F) -> Result<T, E>
where
    F: for<'t> FnOnce(&'t mut (dyn AtomicUnit + 'static)) -> BoxedWork<'t, T, E> + Send,
    T: Send,
    E: From<StorageError> + Send,
{
    let mut unit = backend.begin().await?;
    let outcome = work(unit.as_mut()).await;
    match outcome {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                warn!(backend = backend.kind(), error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
