//! Snapshot row operations.

#![allow(clippy::missing_errors_doc)]

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::core::SqliteSnapshotStore;
use crate::error::StorageError;

/// A raw stored payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    /// Storage key.
    pub key: String,
    /// JSON payload.
    pub payload: String,
    /// When the payload was written.
    pub saved_at: DateTime<Utc>,
}

impl SqliteSnapshotStore {
    /// Insert or replace the payload under `key`.
    pub async fn put_payload(
        &self,
        key: &str,
        payload: &str,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO snapshots (key, payload, saved_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, saved_at = excluded.saved_at",
        )
        .bind(key)
        .bind(payload)
        .bind(saved_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::query_error("UPSERT snapshots", format!("{e}")))?;

        Ok(())
    }

    /// Get the payload stored under `key`.
    pub async fn get_payload(&self, key: &str) -> Result<Option<StoredSnapshot>, StorageError> {
        let row = sqlx::query("SELECT key, payload, saved_at FROM snapshots WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::query_error("SELECT snapshots", format!("{e}")))?;

        match row {
            Some(row) => {
                let saved_at_str: String = row.get("saved_at");
                Ok(Some(StoredSnapshot {
                    key: row.get("key"),
                    payload: row.get("payload"),
                    saved_at: Self::parse_datetime(&saved_at_str)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Delete the payload under `key`. Returns whether a row was removed.
    pub async fn delete_payload(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM snapshots WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::query_error("DELETE snapshots", format!("{e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// All stored keys, most recently saved first.
    pub async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT key FROM snapshots ORDER BY saved_at DESC, key ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::query_error("SELECT snapshots", format!("{e}")))?;

        Ok(rows.iter().map(|row| row.get("key")).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::core::tests::test_store;
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = test_store().await;
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        store.put_payload("a", "{}", at).await.unwrap();

        let stored = store.get_payload("a").await.unwrap().unwrap();
        assert_eq!(stored.key, "a");
        assert_eq!(stored.payload, "{}");
        assert_eq!(stored.saved_at, at);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = test_store().await;
        store.put_payload("a", "1", Utc::now()).await.unwrap();
        store.put_payload("a", "2", Utc::now()).await.unwrap();

        assert_eq!(store.get_payload("a").await.unwrap().unwrap().payload, "2");
        assert_eq!(store.list_keys().await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let store = test_store().await;
        assert!(store.get_payload("nope").await.unwrap().is_none());
        assert!(!store.delete_payload("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = test_store().await;
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store.put_payload("old", "{}", older).await.unwrap();
        store.put_payload("new", "{}", newer).await.unwrap();
        assert_eq!(
            store.list_keys().await.unwrap(),
            vec!["new".to_string(), "old".to_string()]
        );

        assert!(store.delete_payload("old").await.unwrap());
        assert_eq!(store.list_keys().await.unwrap(), vec!["new".to_string()]);
    }
}
