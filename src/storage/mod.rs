use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would take the backend over its byte allotment.
    #[error("storage quota exceeded writing `{key}`: {requested} bytes requested, {available} available")]
    QuotaExceeded {
        key: String,
        requested: u64,
        available: u64,
    },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// String key/value storage with a bounded allotment, the shape of a browser's
/// local storage. Each `set_item` replaces the whole value for `key`.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Bytes an entry is charged against the quota.
pub(crate) fn entry_cost(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}
