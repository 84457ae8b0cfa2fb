// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends.
//!
//! - [`sqlite`]: one database file per sync group
//! - [`postgres`]: one shared pool, rows partitioned by `group_id`
//! - [`traits`]: the [`StorageBackend`] contract and [`run_atomic`]

pub(crate) mod sql;
pub mod postgres;
pub mod sqlite;
pub mod traits;

pub use postgres::PostgresBackend;
pub use sql::{numbered_placeholders, Placeholders};
pub use sqlite::SqliteBackend;
pub use traits::{
    run_atomic, AtomicUnit, BoxedWork, MutateResult, SqlExecutor, SqlRow, SqlValue, StorageBackend,
    StorageError,
};
