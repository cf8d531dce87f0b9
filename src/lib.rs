//! Offline-first local persistence with a replayable sync queue.
//!
//! Entities live in SQLite tables managed by [`EntityRepository`]; every
//! mutation is recorded in the `sync_queue` table in the same transaction,
//! to be replayed later through [`SyncQueue`].

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

#[cfg(test)]
pub(crate) mod test_support;

pub use application::ports::{
    ColumnInfo, QueryResult, Row, SqlValue, Statement, StorageEngine, StorageError,
    SyncTransport, TransportError,
};
pub use application::services::{
    EntityRepository, ReplayFailure, ReplayReport, RepositoryError, SyncAcknowledgement, SyncQueue,
};
pub use domain::entities::{
    EntitySchema, SyncEntity, SyncMetadata, SyncQueueItem, SyncQueueStats, Synced,
    METADATA_FIELDS,
};
pub use domain::value_objects::{EntityId, SyncOperation, SyncStatus};
pub use infrastructure::database::{LifecycleState, SqliteStorage};
pub use shared::config::{AppConfig, DatabaseConfig, SyncConfig};
pub use shared::error::AppError;
pub use shared::logging::init_logging;
