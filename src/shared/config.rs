use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub connection_timeout: u64,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Failed queue items are replayed until they reach this many attempts.
    pub max_retry: u32,
    pub batch_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/offline_store.db".to_string(),
            max_connections: 5,
            connection_timeout: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retry: 3,
            batch_size: 100,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("OFFLINE_STORE_DATABASE_URL") {
            let v = v.trim();
            if !v.is_empty() {
                cfg.database.url = v.to_string();
            }
        }
        if let Some(value) = env_parsed::<u32>("OFFLINE_STORE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value;
        }
        if let Some(value) = env_parsed::<u64>("OFFLINE_STORE_CONNECTION_TIMEOUT") {
            cfg.database.connection_timeout = value;
        }
        if let Some(value) = env_parsed::<u64>("OFFLINE_STORE_BUSY_TIMEOUT_MS") {
            cfg.database.busy_timeout_ms = value;
        }
        if let Some(value) = env_parsed::<u32>("OFFLINE_STORE_SYNC_MAX_RETRY") {
            cfg.sync.max_retry = value;
        }
        if let Some(value) = env_parsed::<u32>("OFFLINE_STORE_SYNC_BATCH_SIZE") {
            cfg.sync.batch_size = value.max(1);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.database.connection_timeout == 0 {
            return Err("Database connection_timeout must be greater than 0".to_string());
        }
        if self.sync.batch_size == 0 {
            return Err("Sync batch_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}
