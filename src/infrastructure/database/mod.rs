pub mod lifecycle;
pub mod sqlite_storage;
mod value_codec;


pub use lifecycle::LifecycleState;
pub use sqlite_storage::SqliteStorage;
