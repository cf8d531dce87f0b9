use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not initialized")]
    NotInitialized,

    #[error("Failed to open database {url}: {source}")]
    Open { url: String, source: sqlx::Error },

    #[error("Failed to prepare database directory {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Query failed: {source} (sql: {sql})")]
    Query { sql: String, source: sqlx::Error },

    #[error("Statement changed no rows (sql: {sql})")]
    Unchanged { sql: String },

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Failed to decode column {column}: {message}")]
    Decode { column: String, message: String },
}

impl StorageError {
    pub fn query(sql: impl Into<String>, source: sqlx::Error) -> Self {
        StorageError::Query {
            sql: sql.into(),
            source,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        match self {
            StorageError::Query {
                source: sqlx::Error::Database(db),
                ..
            } => db.is_unique_violation(),
            _ => false,
        }
    }

    /// SQLite reports violations as `UNIQUE constraint failed: table.column`.
    pub fn is_unique_violation_on(&self, qualified_column: &str) -> bool {
        match self {
            StorageError::Query {
                source: sqlx::Error::Database(db),
                ..
            } => db.is_unique_violation() && db.message().contains(qualified_column),
            _ => false,
        }
    }

    /// The statement that failed, when the error came from one.
    pub fn sql(&self) -> Option<&str> {
        match self {
            StorageError::Query { sql, .. } | StorageError::Unchanged { sql } => Some(sql),
            _ => None,
        }
    }
}
