use crate::domain::entities::SyncQueueItem;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Remote sync failed: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for TransportError {
    fn from(err: anyhow::Error) -> Self {
        TransportError::new(err.to_string())
    }
}

/// Remote side of queue replay. Implementations pick the request from
/// `item.operation.http_method()` and send `item.data` as the body.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Returns the server-assigned version of the entity, when the backend
    /// reports one.
    async fn push(&self, item: &SyncQueueItem) -> Result<Option<i64>, TransportError>;
}
