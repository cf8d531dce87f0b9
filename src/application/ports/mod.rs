pub mod storage_engine;
pub mod storage_error;
pub mod sync_transport;

pub use storage_engine::{
    delete_statement, insert_statement, select_sql, update_statement, validate_identifier,
    ColumnInfo, QueryResult, Row, SqlValue, Statement, StorageEngine,
};
pub use storage_error::StorageError;
pub use sync_transport::{SyncTransport, TransportError};
