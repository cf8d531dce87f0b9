pub mod entity_id;
pub mod sync_operation;
pub mod sync_status;

pub use entity_id::EntityId;
pub use sync_operation::SyncOperation;
pub use sync_status::SyncStatus;
