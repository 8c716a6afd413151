//! `SnapshotStore` implementation for `SqliteSnapshotStore`.

#![allow(clippy::missing_errors_doc)]

use async_trait::async_trait;

use crate::engine::PersistedState;
use crate::error::StorageError;
use crate::traits::SnapshotStore;

use super::core::SqliteSnapshotStore;

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save(&self, key: &str, state: &PersistedState) -> Result<(), StorageError> {
        let payload = state.to_json().map_err(|e| StorageError::Serialization {
            message: format!("Failed to encode state: {e}"),
        })?;
        self.put_payload(key, &payload, state.saved_at).await
    }

    async fn load(&self, key: &str) -> Result<Option<PersistedState>, StorageError> {
        let Some(stored) = self.get_payload(key).await? else {
            return Ok(None);
        };
        PersistedState::from_json(&stored.payload)
            .map(Some)
            .map_err(|e| StorageError::Serialization {
                message: format!("Failed to decode state '{key}': {e}"),
            })
    }
}
