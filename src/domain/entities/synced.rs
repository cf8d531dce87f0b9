use super::EntitySchema;
use crate::domain::value_objects::{EntityId, SyncStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Column names owned by the repository. Domain payloads must not reuse them.
pub const METADATA_FIELDS: [&str; 7] = [
    "id",
    "created_at",
    "updated_at",
    "is_deleted",
    "local_version",
    "server_version",
    "sync_status",
];

/// A domain payload that can be persisted through an `EntityRepository`.
pub trait SyncEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const SCHEMA: EntitySchema;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub id: EntityId,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
    pub local_version: i64,
    #[serde(default)]
    pub server_version: Option<i64>,
    pub sync_status: SyncStatus,
}

impl SyncMetadata {
    pub fn new(id: EntityId, now_ms: i64) -> Self {
        Self {
            id,
            created_at: now_ms,
            updated_at: now_ms,
            is_deleted: false,
            local_version: 1,
            server_version: None,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Records one local mutation on top of the version that was read.
    pub fn bump(&mut self, now_ms: i64) {
        self.updated_at = now_ms.max(self.updated_at);
        self.local_version += 1;
        self.sync_status = SyncStatus::Pending;
    }
}

/// A persisted entity: repository metadata plus the domain payload, flattened
/// into a single JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synced<T> {
    #[serde(flatten)]
    pub meta: SyncMetadata,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Synced<T> {
    pub fn id(&self) -> &EntityId {
        &self.meta.id
    }

    pub fn local_version(&self) -> i64 {
        self.meta.local_version
    }

    pub fn is_deleted(&self) -> bool {
        self.meta.is_deleted
    }
}
