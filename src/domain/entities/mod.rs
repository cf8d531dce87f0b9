pub mod entity_schema;
pub mod sync_queue_item;
pub mod synced;

pub use entity_schema::EntitySchema;
pub use sync_queue_item::{SyncQueueItem, SyncQueueStats};
pub use synced::{SyncEntity, SyncMetadata, Synced, METADATA_FIELDS};
