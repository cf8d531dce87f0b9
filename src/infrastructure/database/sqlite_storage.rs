use super::lifecycle::{Lifecycle, LifecycleState};
use super::value_codec::{is_read_only, run_statement};
use crate::application::ports::{QueryResult, SqlValue, Statement, StorageEngine, StorageError};
use crate::shared::config::DatabaseConfig;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// SQLite-backed storage engine.
///
/// One instance is shared (behind an `Arc`) by every repository of a
/// process. Writes are serialized by an in-process writer lock on top of
/// SQLite's own locking.
pub struct SqliteStorage {
    database_url: String,
    max_connections: u32,
    busy_timeout: Duration,
    acquire_timeout: Duration,
    lifecycle: RwLock<Lifecycle>,
    init_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

impl SqliteStorage {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self::from_config(&DatabaseConfig {
            url: database_url.into(),
            ..DatabaseConfig::default()
        })
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            database_url: config.url.clone(),
            max_connections: config.max_connections.max(1),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            acquire_timeout: Duration::from_secs(config.connection_timeout),
            lifecycle: RwLock::new(Lifecycle::new()),
            init_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        }
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.read().await.state().clone()
    }

    fn is_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Filesystem location of a file-backed database URL.
    fn database_path(&self) -> Option<PathBuf> {
        if self.is_memory() {
            return None;
        }
        let path = self
            .database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        let path = path.split('?').next().unwrap_or_default();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }

    async fn pool(&self) -> Result<SqlitePool, StorageError> {
        self.lifecycle.read().await.pool()
    }

    async fn open(&self) -> Result<SqlitePool, StorageError> {
        if let Some(parent) = self.database_path().and_then(|p| p.parent().map(PathBuf::from)) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(&parent).map_err(|source| StorageError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let open_err = |source: sqlx::Error| StorageError::Open {
            url: self.database_url.clone(),
            source,
        };

        let mut options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(open_err)?
            .create_if_missing(true)
            .busy_timeout(self.busy_timeout);

        // A memory database lives and dies with its connection, so the pool
        // keeps exactly one open forever.
        let pool_options = if self.is_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(self.max_connections)
        };

        let pool = pool_options
            .acquire_timeout(self.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(open_err)?;

        info!("Database connected: {}", self.database_url);

        if let Err(err) = Self::run_migrations(&pool).await {
            pool.close().await;
            return Err(err);
        }

        Ok(pool)
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
        info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(pool).await?;

        info!("Database migrations completed");
        Ok(())
    }

    async fn run_batch(
        tx: &mut Transaction<'_, Sqlite>,
        statements: &[Statement],
    ) -> Result<Vec<QueryResult>, StorageError> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            debug!(sql = %statement.sql, params = statement.params.len(), "transaction statement");
            let result = run_statement(&mut **tx, &statement.sql, &statement.params).await?;
            if statement.expect_changes && result.rows_affected == 0 {
                return Err(StorageError::Unchanged {
                    sql: statement.sql.clone(),
                });
            }
            results.push(result);
        }
        Ok(results)
    }
}

#[async_trait]
impl StorageEngine for SqliteStorage {
    async fn initialize(&self) -> Result<(), StorageError> {
        // Concurrent callers queue here and observe the first caller's result.
        let _init = self.init_lock.lock().await;

        if self.lifecycle.read().await.state().is_ready() {
            return Ok(());
        }

        self.lifecycle.write().await.begin();
        match self.open().await {
            Ok(pool) => {
                self.lifecycle.write().await.ready(pool);
                Ok(())
            }
            Err(err) => {
                warn!("Database initialization failed: {}", err);
                self.lifecycle.write().await.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn close(&self) {
        let _init = self.init_lock.lock().await;
        let pool = self.lifecycle.write().await.close();
        if let Some(pool) = pool {
            // Wait for in-flight writes before tearing the pool down.
            let _write = self.write_lock.lock().await;
            pool.close().await;
            info!("Database closed: {}", self.database_url);
        }
    }

    async fn execute_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, StorageError> {
        let pool = self.pool().await?;
        debug!(sql = %sql, params = params.len(), "execute query");

        if is_read_only(sql) {
            return run_statement(&pool, sql, params).await;
        }

        let _write = self.write_lock.lock().await;
        run_statement(&pool, sql, params).await
    }

    async fn execute_transaction(
        &self,
        statements: Vec<Statement>,
    ) -> Result<Vec<QueryResult>, StorageError> {
        let pool = self.pool().await?;
        let _write = self.write_lock.lock().await;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| StorageError::query("BEGIN", e))?;

        match Self::run_batch(&mut tx, &statements).await {
            Ok(results) => {
                tx.commit()
                    .await
                    .map_err(|e| StorageError::query("COMMIT", e))?;
                Ok(results)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback failed after {}: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }
}
