use crate::application::ports::StorageError;
use sqlx::SqlitePool;
use std::fmt;

/// Observable state of a storage engine's connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

impl LifecycleState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LifecycleState::Ready)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => write!(f, "uninitialized"),
            LifecycleState::Initializing => write!(f, "initializing"),
            LifecycleState::Ready => write!(f, "ready"),
            LifecycleState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Connection slot guarded by the engine. A pool exists only in `Ready`.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: LifecycleState,
    pool: Option<SqlitePool>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            pool: None,
        }
    }

    pub(crate) fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub(crate) fn pool(&self) -> Result<SqlitePool, StorageError> {
        match (&self.state, &self.pool) {
            (LifecycleState::Ready, Some(pool)) => Ok(pool.clone()),
            _ => Err(StorageError::NotInitialized),
        }
    }

    pub(crate) fn begin(&mut self) {
        self.state = LifecycleState::Initializing;
        self.pool = None;
    }

    pub(crate) fn ready(&mut self, pool: SqlitePool) {
        self.state = LifecycleState::Ready;
        self.pool = Some(pool);
    }

    pub(crate) fn fail(&mut self, reason: String) {
        self.state = LifecycleState::Failed(reason);
        self.pool = None;
    }

    /// Returns the pool that was open, if any, leaving the slot uninitialized.
    pub(crate) fn close(&mut self) -> Option<SqlitePool> {
        self.state = LifecycleState::Uninitialized;
        self.pool.take()
    }
}
