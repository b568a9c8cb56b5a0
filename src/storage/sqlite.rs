use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use super::{entry_cost, LocalStorage, StorageError};

/// Durable key/value storage in a single SQLite table.
///
/// Writes are serialized per storage (clones share the lock): the quota check
/// and the upsert must see the same table, and a deferred SQLite transaction
/// cannot upgrade to a write while another connection is writing.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    quota_bytes: Option<u64>,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteStorage {
    pub async fn connect(url: &str, quota_bytes: Option<u64>) -> anyhow::Result<Self> {
        // an in-memory database exists per connection, so it must not be pooled
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("connect to storage {url}"))?;
        Self::from_pool(pool, quota_bytes).await
    }

    pub async fn from_pool(pool: SqlitePool, quota_bytes: Option<u64>) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run storage migrations")?;
        Ok(Self {
            pool,
            quota_bytes,
            write_lock: Arc::new(Mutex::new(())),
        })
    }
}

#[async_trait]
impl LocalStorage for SqliteStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = sqlx::query_scalar::<_, String>(
            r#"SELECT value FROM local_storage WHERE key = ?1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("select local_storage item")?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.context("begin tx")?;

        if let Some(quota) = self.quota_bytes {
            let others = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                  FROM local_storage
                 WHERE key <> ?1
                "#,
            )
            .bind(key)
            .fetch_one(&mut *tx)
            .await
            .context("measure local_storage usage")?;

            let requested = entry_cost(key, value);
            let available = quota.saturating_sub(others.max(0) as u64);
            if requested > available {
                debug!(key, requested, available, "sqlite storage quota exceeded");
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available,
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(OffsetDateTime::now_utc().unix_timestamp())
        .execute(&mut *tx)
        .await
        .context("upsert local_storage item")?;

        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(r#"DELETE FROM local_storage WHERE key = ?1"#)
            .bind(key)
            .execute(&self.pool)
            .await
            .context("delete local_storage item")?;
        Ok(())
    }
}

#[cfg(test)]
mod sqlite_tests {
    use super::*;

    async fn memory_storage(quota: Option<u64>) -> SqliteStorage {
        SqliteStorage::connect("sqlite::memory:", quota)
            .await
            .expect("in-memory sqlite")
    }

    #[tokio::test]
    async fn upsert_and_remove() {
        let s = memory_storage(None).await;
        s.set_item("meals", "[]").await.unwrap();
        s.set_item("meals", "[1]").await.unwrap();
        assert_eq!(s.get_item("meals").await.unwrap().as_deref(), Some("[1]"));
        s.remove_item("meals").await.unwrap();
        assert_eq!(s.get_item("meals").await.unwrap(), None);
    }

    #[tokio::test]
    async fn quota_counts_other_keys_only() {
        let s = memory_storage(Some(20)).await;
        s.set_item("a", "123456789").await.unwrap(); // 10
        s.set_item("a", "987654321").await.unwrap();
        s.set_item("b", "12345678").await.unwrap(); // 9
        let err = s.set_item("c", "xy").await.unwrap_err();
        match err {
            StorageError::QuotaExceeded { requested, available, .. } => {
                assert_eq!(requested, 3);
                assert_eq!(available, 1);
            }
            other => panic!("expected quota error, got {other:?}"),
        }
        assert_eq!(s.get_item("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_writes_to_many_keys_all_land_within_quota() {
        use futures_util::future::join_all;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("busy.db").display());
        let quota = 200;
        let s = SqliteStorage::connect(&url, Some(quota)).await.unwrap();

        let keys = ["meals", "activity_data", "goals", "profile"];
        let results = join_all((0..40).map(|i| {
            let s = s.clone();
            let key = keys[i % keys.len()];
            async move { s.set_item(key, &format!("value-{i:02}")).await }
        }))
        .await;

        for result in &results {
            assert!(result.is_ok(), "write failed: {result:?}");
        }
        let mut used = 0;
        for key in keys {
            let value = s.get_item(key).await.unwrap().expect("every key written");
            used += entry_cost(key, &value);
        }
        assert!(used <= quota);
    }

    #[tokio::test]
    async fn shared_quota_is_enforced_across_concurrent_keys() {
        use futures_util::future::join_all;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("tight.db").display());
        // room for two of the three 20-byte entries
        let s = SqliteStorage::connect(&url, Some(45)).await.unwrap();

        let results = join_all(["key-a", "key-b", "key-c"].map(|key| {
            let s = s.clone();
            async move { s.set_item(key, "0123456789abcde").await }
        }))
        .await;

        let written = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_quota()))
            .count();
        assert_eq!((written, rejected), (2, 1));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("store.db").display());
        {
            let s = SqliteStorage::connect(&url, None).await.unwrap();
            s.set_item("activity_data", "{}").await.unwrap();
            s.pool.close().await;
        }
        let reopened = SqliteStorage::connect(&url, None).await.unwrap();
        assert_eq!(
            reopened.get_item("activity_data").await.unwrap().as_deref(),
            Some("{}")
        );
    }
}
