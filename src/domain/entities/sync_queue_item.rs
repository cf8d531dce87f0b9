use super::Synced;
use crate::domain::value_objects::{EntityId, SyncOperation, SyncStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One pending mutation intent, as stored in `sync_queue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: EntityId,
    pub operation: SyncOperation,
    /// Full snapshot of the entity right after the mutation.
    pub data: Value,
    pub created_at: i64,
    pub retry_count: u32,
    pub status: SyncStatus,
    pub last_error: Option<String>,
}

impl SyncQueueItem {
    pub fn snapshot<T: DeserializeOwned>(&self) -> Result<Synced<T>, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }

    /// `local_version` carried by the snapshot, if any.
    pub fn snapshot_version(&self) -> Option<i64> {
        self.data.get("local_version").and_then(Value::as_i64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueStats {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
}

impl SyncQueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.in_progress + self.completed + self.failed
    }
}
