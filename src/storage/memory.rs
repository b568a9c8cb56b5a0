use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{entry_cost, LocalStorage, StorageError};

/// In-process storage. Nothing survives the process; used by tests and by
/// `AppState::fake()`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub async fn used_bytes(&self) -> u64 {
        let items = self.items.read().await;
        items.iter().map(|(k, v)| entry_cost(k, v)).sum()
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.write().await;
        if let Some(quota) = self.quota_bytes {
            let others: u64 = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_cost(k, v))
                .sum();
            let requested = entry_cost(key, value);
            let available = quota.saturating_sub(others);
            if requested > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available,
                });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}
