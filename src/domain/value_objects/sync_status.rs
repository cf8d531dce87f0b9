use serde::{Deserialize, Serialize};
use std::fmt;

/// Propagation state shared by entities and sync queue rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Unknown(String),
}

impl SyncStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::InProgress => "IN_PROGRESS",
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Failed => "FAILED",
            SyncStatus::Unknown(value) => value.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for SyncStatus {
    fn from(value: &str) -> Self {
        match value {
            "PENDING" => SyncStatus::Pending,
            "IN_PROGRESS" => SyncStatus::InProgress,
            "COMPLETED" => SyncStatus::Completed,
            "FAILED" => SyncStatus::Failed,
            other => SyncStatus::Unknown(other.to_string()),
        }
    }
}

impl From<String> for SyncStatus {
    fn from(value: String) -> Self {
        SyncStatus::from(value.as_str())
    }
}

impl From<SyncStatus> for String {
    fn from(value: SyncStatus) -> Self {
        value.as_str().to_string()
    }
}
