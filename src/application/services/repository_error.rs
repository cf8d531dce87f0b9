use crate::application::ports::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: &'static str, id: String },

    #[error("{entity_type} {id} already exists")]
    AlreadyExists { entity_type: &'static str, id: String },

    #[error("{entity_type} {id} conflict: local_version {expected_version} was changed by another writer")]
    Conflict {
        entity_type: &'static str,
        id: String,
        expected_version: i64,
    },

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error("Failed to decode field {field}: {source}")]
    Decode {
        field: String,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict { .. })
    }
}
