// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Group addressing: where a group's rows live.
//!
//! - [`FileAddressing`]: `<user_files>/group-<id>.sqlite`, created on first
//!   use and closed after every call.
//! - [`SharedAddressing`]: one PostgreSQL pool, rows filtered by `group_id`.
//!
//! The strategy is picked once per process by [`from_config`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::config::{DatabaseType, SyncServerConfig};
use crate::error::SyncError;
use crate::schema::SchemaLayout;
use crate::storage::{PostgresBackend, SqliteBackend, StorageBackend, StorageError};

/// Longest accepted group id, in bytes.
pub const MAX_GROUP_ID_LEN: usize = 255;

/// Accept ASCII letters, digits, `-`, `_` and `.` only, without `..`.
///
/// The id becomes a file name and then part of a connection URL, so any
/// character with meaning in either (`/`, `%`, `?`, `#`, ...) is refused.
/// Distinct ids therefore always map to distinct files.
pub fn validate_group_id(group_id: &str) -> Result<(), SyncError> {
    let invalid = group_id.is_empty()
        || group_id.len() > MAX_GROUP_ID_LEN
        || !group_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        || group_id.contains("..");
    if invalid {
        return Err(SyncError::InvalidGroupId(group_id.to_string()));
    }
    Ok(())
}

/// A resolved group: the backend to use and how rows are laid out in it.
pub struct StorageHandle {
    backend: Arc<dyn StorageBackend>,
    layout: SchemaLayout,
    owned: bool,
}

impl StorageHandle {
    /// Handle that closes its backend on release.
    pub fn owned(backend: Arc<dyn StorageBackend>, layout: SchemaLayout) -> Self {
        Self { backend, layout, owned: true }
    }

    /// Handle over a backend shared with other groups.
    pub fn shared(backend: Arc<dyn StorageBackend>, layout: SchemaLayout) -> Self {
        Self { backend, layout, owned: false }
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn layout(&self) -> SchemaLayout {
        self.layout
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Close the backend if this handle owns it.
    pub async fn release(self) {
        if self.owned {
            self.backend.close().await;
        }
    }
}

#[async_trait]
pub trait GroupAddressing: Send + Sync {
    /// Backend label for logs and metrics.
    fn backend_name(&self) -> &'static str;

    /// Resolve `group_id` to a usable handle, creating its storage if needed.
    async fn resolve_handle(&self, group_id: &str) -> Result<StorageHandle, SyncError>;
}

/// One SQLite file per group.
#[derive(Debug, Clone)]
pub struct FileAddressing {
    user_files: PathBuf,
}

impl FileAddressing {
    pub fn new(user_files: impl Into<PathBuf>) -> Self {
        Self { user_files: user_files.into() }
    }

    pub fn user_files(&self) -> &Path {
        &self.user_files
    }

    pub fn path_for_group(&self, group_id: &str) -> Result<PathBuf, SyncError> {
        validate_group_id(group_id)?;
        Ok(self.user_files.join(format!("group-{}.sqlite", group_id)))
    }

    async fn create_schema(backend: &SqliteBackend) -> Result<(), StorageError> {
        backend.exec_raw(SchemaLayout::Dedicated.ddl()).await?;
        backend.enable_wal_mode().await
    }
}

#[async_trait]
impl GroupAddressing for FileAddressing {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self))]
    async fn resolve_handle(&self, group_id: &str) -> Result<StorageHandle, SyncError> {
        let path = self.path_for_group(group_id)?;
        let exists = tokio::fs::metadata(&path).await.is_ok();

        if !exists {
            tokio::fs::create_dir_all(&self.user_files).await.map_err(|e| {
                StorageError::Backend(format!(
                    "Failed to create {}: {}",
                    self.user_files.display(),
                    e
                ))
            })?;
        }

        let backend = SqliteBackend::open(&path).await?;

        // The DDL is idempotent; a file left empty by a crash or still being
        // set up by another process gets its tables here.
        if let Err(e) = Self::create_schema(&backend).await {
            backend.close().await;
            if !exists {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "Failed to remove half-created group file");
                }
            }
            return Err(e.into());
        }

        if !exists {
            info!(group_id, path = %path.display(), "Group database created");
            crate::metrics::record_group_created("sqlite");
        } else {
            debug!(path = %path.display(), "Group database opened");
        }

        Ok(StorageHandle::owned(Arc::new(backend), SchemaLayout::Dedicated))
    }
}

/// All groups in one shared database, partitioned by `group_id`.
pub struct SharedAddressing {
    backend: Arc<dyn StorageBackend>,
}

impl SharedAddressing {
    /// Wrap a shared backend, applying the partitioned schema once.
    pub async fn new(backend: Arc<dyn StorageBackend>) -> Result<Self, SyncError> {
        backend.exec_raw(SchemaLayout::Partitioned.ddl()).await?;
        info!(backend = backend.kind(), "Shared group schema ready");
        Ok(Self { backend })
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }
}

#[async_trait]
impl GroupAddressing for SharedAddressing {
    fn backend_name(&self) -> &'static str {
        self.backend.kind()
    }

    async fn resolve_handle(&self, group_id: &str) -> Result<StorageHandle, SyncError> {
        validate_group_id(group_id)?;
        Ok(StorageHandle::shared(Arc::clone(&self.backend), SchemaLayout::Partitioned))
    }
}

/// Pick the addressing strategy for this process.
pub async fn from_config(config: &SyncServerConfig) -> Result<Arc<dyn GroupAddressing>, SyncError> {
    match config.effective_backend() {
        DatabaseType::Sqlite => {
            info!(user_files = %config.user_files.display(), "Using per-group SQLite files");
            Ok(Arc::new(FileAddressing::new(config.user_files.clone())))
        }
        DatabaseType::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| SyncError::Config("database_url is required for postgres".into()))?;
            let backend = PostgresBackend::connect(
                url,
                config.max_connections,
                Duration::from_secs(config.acquire_timeout_secs),
            )
            .await?;
            Ok(Arc::new(SharedAddressing::new(Arc::new(backend)).await?))
        }
    }
}
