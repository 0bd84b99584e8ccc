//! Persistence of accepted context information.
//!
//! One logical table per distinct name + parameter set
//! ([`ContextInformation::table_name`]); each row records the value, the
//! data type and when it was created. Writes go through a [`WriteBuffer`]
//! that is flushed when either its count or its age threshold is exceeded;
//! reads flush first so they always see every stored row.

mod buffer;
mod file;
mod memory;

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::BoxFuture;
use crate::context::{ContextInformation, ContextInformationList};
use ctxmesh_config::StorageConfig;

pub use buffer::{FlushPolicy, WriteBuffer};
pub use file::FileStorage;
pub use memory::InMemoryStorage;

/// Errors from storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),
}

/// One persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub value: Value,
    pub data_type: String,
    pub created_at: SystemTime,
}

impl StoredRow {
    pub fn of(item: &ContextInformation) -> Self {
        Self {
            value: item.value().clone(),
            data_type: item.data_type().to_string(),
            created_at: item.timestamp().unwrap_or_else(SystemTime::now),
        }
    }
}

/// A persistence backend.
pub trait Storage: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Queue an item for persistence and record it as the table's current
    /// value.
    fn store(&self, item: &ContextInformation) -> Result<(), StorageError>;

    /// Write out everything buffered. Returns the number of rows written.
    fn flush(&self) -> Result<usize, StorageError>;

    /// The most recently stored item of every table.
    fn current_data(&self) -> Result<ContextInformationList, StorageError>;

    /// Every row of one table, oldest first.
    fn retrieve_named<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<StoredRow>, StorageError>>;

    /// Names of every table, sorted.
    fn names_overview(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>>;
}

/// Build the configured backend. `"none"` yields no backend at all.
pub fn from_config(config: &StorageConfig) -> Result<Option<Arc<dyn Storage>>, StorageError> {
    let policy = FlushPolicy::from_config(config);
    let storage: Arc<dyn Storage> = match config.backend.as_str() {
        "none" => {
            info!("Storage disabled");
            return Ok(None);
        }
        "memory" => Arc::new(InMemoryStorage::new(policy)),
        "file" => Arc::new(FileStorage::new(&config.directory, policy)?),
        other => return Err(StorageError::UnknownBackend(other.to_string())),
    };
    info!(backend = storage.name(), "Storage initialised");
    Ok(Some(storage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: &str, directory: &str) -> StorageConfig {
        StorageConfig {
            backend: backend.to_string(),
            directory: directory.to_string(),
            ..StorageConfig::default()
        }
    }

    #[test]
    fn test_from_config_backends() {
        assert!(from_config(&config("none", "")).unwrap().is_none());
        assert_eq!(from_config(&config("memory", "")).unwrap().unwrap().name(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");
        let storage = from_config(&config("file", path.to_str().unwrap())).unwrap().unwrap();
        assert_eq!(storage.name(), "file");
        assert!(path.is_dir());
    }

    #[test]
    fn test_from_config_rejects_unknown_backend() {
        let err = from_config(&config("sqlite", "")).err().unwrap();
        assert!(matches!(err, StorageError::UnknownBackend(b) if b == "sqlite"));
    }
}
