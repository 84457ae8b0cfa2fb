// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! sqlx `Any` driver plumbing shared by both backends.
//!
//! ## sqlx Any Driver Quirks
//!
//! - Drivers must be installed at runtime before the first connect.
//! - The Any driver forwards statement text untouched, so PostgreSQL still
//!   needs `$1, $2, …` placeholders. Statements in this crate are written with
//!   `?` and rewritten by [`Placeholders::Numbered`].
//! - Column types are only known per value, so rows are decoded by trying the
//!   supported types in turn (integers, reals, text, then bytes).
//! - The Any driver drops SQLite's last insert rowid from query results. It is
//!   read back with `last_insert_rowid()` on the same connection.

use std::borrow::Cow;
use std::sync::Once;

use async_trait::async_trait;
use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{AnyConnection, AnyPool, Column, Row, Transaction, ValueRef};

use super::traits::{AtomicUnit, MutateResult, SqlExecutor, SqlRow, SqlValue, StorageError};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

pub(crate) fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Placeholder syntax expected by the underlying driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholders {
    /// `?` passed through (SQLite).
    Positional,
    /// `?` rewritten to `$1, $2, …` (PostgreSQL).
    Numbered,
}

impl Placeholders {
    pub fn rewrite<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match self {
            Self::Positional => Cow::Borrowed(sql),
            Self::Numbered => numbered_placeholders(sql),
        }
    }
}

/// Rewrite each `?` outside quoted literals/identifiers into `$n`.
pub fn numbered_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0usize;
    let mut quote: Option<char> = None;

    for ch in sql.chars() {
        match quote {
            Some(q) => {
                // A doubled quote ('') closes and immediately reopens, same result
                if ch == q {
                    quote = None;
                }
                out.push(ch);
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(ch),
            },
        }
    }

    Cow::Owned(out)
}

/// Bind positional parameters in order.
pub(crate) fn bind_params<'q>(
    sql: &'q str,
    params: &[SqlValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    let mut query = sqlx::query::<Any>(sql);
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Integer(value) => query.bind(*value),
            SqlValue::Real(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.clone()),
            SqlValue::Blob(value) => query.bind(value.clone()),
        };
    }
    query
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StorageError::UniqueViolation(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

pub(crate) fn decode_row(row: &AnyRow) -> Result<SqlRow, StorageError> {
    let mut columns = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, index).ok_or_else(|| StorageError::Column {
            column: column.name().to_string(),
            expected: "a supported SQL type",
        })?;
        columns.push((column.name().to_string(), value));
    }
    Ok(SqlRow::new(columns))
}

fn decode_value(row: &AnyRow, index: usize) -> Option<SqlValue> {
    let raw = row.try_get_raw(index).ok()?;
    if raw.is_null() {
        return Some(SqlValue::Null);
    }

    if let Ok(value) = row.try_get::<i64, _>(index) {
        return Some(SqlValue::Integer(value));
    }
    if let Ok(value) = row.try_get::<i32, _>(index) {
        return Some(SqlValue::Integer(i64::from(value)));
    }
    if let Ok(value) = row.try_get::<i16, _>(index) {
        return Some(SqlValue::Integer(i64::from(value)));
    }
    if let Ok(value) = row.try_get::<bool, _>(index) {
        return Some(SqlValue::Integer(i64::from(value)));
    }
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return Some(SqlValue::Real(value));
    }
    if let Ok(value) = row.try_get::<String, _>(index) {
        return Some(SqlValue::Text(value));
    }
    if let Ok(value) = row.try_get::<Vec<u8>, _>(index) {
        return Some(SqlValue::Blob(value));
    }
    None
}

/// Fetch all rows through the pool (autocommit).
pub(crate) async fn pool_query(
    pool: &AnyPool,
    placeholders: Placeholders,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<SqlRow>, StorageError> {
    let sql = placeholders.rewrite(sql);
    let rows = bind_params(&sql, params)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;
    rows.iter().map(decode_row).collect()
}

pub(crate) async fn pool_mutate(
    pool: &AnyPool,
    placeholders: Placeholders,
    sql: &str,
    params: &[SqlValue],
) -> Result<MutateResult, StorageError> {
    let mut conn = pool.acquire().await.map_err(map_sqlx_error)?;
    mutate_on(&mut conn, placeholders, sql, params).await
}

/// Rowid lookup for dialects whose Any results carry no insert id.
/// Positional placeholders are the SQLite dialect.
fn rowid_query(placeholders: Placeholders) -> Option<&'static str> {
    match placeholders {
        Placeholders::Positional => Some("SELECT last_insert_rowid() AS id"),
        Placeholders::Numbered => None,
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

/// Execute one statement and report changes plus the inserted rowid.
/// Both run on `conn`, so the rowid belongs to this statement.
async fn mutate_on(
    conn: &mut AnyConnection,
    placeholders: Placeholders,
    sql: &str,
    params: &[SqlValue],
) -> Result<MutateResult, StorageError> {
    let rewritten = placeholders.rewrite(sql);
    let result = bind_params(&rewritten, params)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

    let changes = result.rows_affected();
    let mut last_insert_id = result.last_insert_id();
    if let Some(rowid_sql) = rowid_query(placeholders) {
        if last_insert_id.is_none() && changes > 0 && is_insert(sql) {
            let row = sqlx::query::<Any>(rowid_sql)
                .fetch_one(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            last_insert_id = Some(row.try_get::<i64, _>(0).map_err(map_sqlx_error)?);
        }
    }

    Ok(MutateResult { changes, last_insert_id })
}

/// Execute DDL one statement at a time (SQLite rejects multi-statement prepares).
pub(crate) async fn pool_exec_raw(pool: &AnyPool, ddl: &str) -> Result<(), StorageError> {
    for stmt in ddl.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query::<Any>(stmt)
            .execute(pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to apply schema: {}", e)))?;
    }
    Ok(())
}

/// Open transaction on an Any pool.
pub(crate) struct AnyUnit {
    tx: Transaction<'static, Any>,
    placeholders: Placeholders,
}

impl AnyUnit {
    pub(crate) async fn begin(pool: &AnyPool, placeholders: Placeholders) -> Result<Self, StorageError> {
        let tx = pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to begin transaction: {}", e)))?;
        Ok(Self { tx, placeholders })
    }
}

#[async_trait]
impl SqlExecutor for AnyUnit {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, StorageError> {
        let sql = self.placeholders.rewrite(sql);
        let rows = bind_params(&sql, params)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn mutate(&mut self, sql: &str, params: &[SqlValue]) -> Result<MutateResult, StorageError> {
        mutate_on(&mut self.tx, self.placeholders, sql, params).await
    }
}

#[async_trait]
impl AtomicUnit for AnyUnit {
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to roll back transaction: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_placeholders() {
        let sql = "SELECT * FROM messages_binary WHERE group_id = ? AND timestamp > ? ORDER BY timestamp";
        assert_eq!(
            numbered_placeholders(sql),
            "SELECT * FROM messages_binary WHERE group_id = $1 AND timestamp > $2 ORDER BY timestamp"
        );
    }

    #[test]
    fn test_placeholders_inside_literals_untouched() {
        let sql = "SELECT '?' AS q, \"odd?col\" FROM t WHERE a = ? AND b = 'it''s ?' AND c = ?";
        assert_eq!(
            numbered_placeholders(sql),
            "SELECT '?' AS q, \"odd?col\" FROM t WHERE a = $1 AND b = 'it''s ?' AND c = $2"
        );
    }

    #[test]
    fn test_no_placeholders_borrows() {
        let sql = "SELECT 1";
        assert!(matches!(numbered_placeholders(sql), Cow::Borrowed(_)));
        assert!(matches!(Placeholders::Positional.rewrite("a = ?"), Cow::Borrowed("a = ?")));
    }

    #[test]
    fn test_insert_detection() {
        assert!(is_insert("INSERT INTO t VALUES (?)"));
        assert!(is_insert("  insert into t values (?)"));
        assert!(!is_insert("UPDATE t SET v = ?"));
        assert!(!is_insert("ins"));
        assert_eq!(rowid_query(Placeholders::Numbered), None);
    }

    #[test]
    fn test_positional_passthrough() {
        assert_eq!(Placeholders::Positional.rewrite("VALUES (?, ?)"), "VALUES (?, ?)");
        assert_eq!(Placeholders::Numbered.rewrite("VALUES (?, ?)"), "VALUES ($1, $2)");
    }
}
