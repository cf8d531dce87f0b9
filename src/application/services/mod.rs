pub mod entity_repository;
pub mod repository_error;
pub mod sync_queue;

pub use entity_repository::EntityRepository;
pub use repository_error::RepositoryError;
pub use sync_queue::{ReplayFailure, ReplayReport, SyncAcknowledgement, SyncQueue};

/// Wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
