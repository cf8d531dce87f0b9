
use crate::application::ports::{Row, SqlValue, Statement, StorageEngine, StorageError, SyncTransport};
use crate::domain::entities::{SyncQueueItem, SyncQueueStats};
use crate::domain::value_objects::{EntityId, SyncOperation, SyncStatus};
use crate::shared::config::SyncConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_MAX_RETRY: u32 = 3;
const DEFAULT_BATCH_SIZE: u32 = 100;

/// Successful replay of one queue item, to be applied to the local entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAcknowledgement {
    pub queue_id: i64,
    pub entity_type: String,
    pub entity_id: EntityId,
    /// Version of the snapshot that was pushed.
    pub local_version: Option<i64>,
    /// Version assigned by the remote side, if it reports one.
    pub server_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFailure {
    pub queue_id: i64,
    pub entity_type: String,
    pub entity_id: EntityId,
    pub local_version: Option<i64>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub acknowledgements: Vec<SyncAcknowledgement>,
    pub failures: Vec<ReplayFailure>,
    /// Items held back because an earlier item of the same entity failed.
    pub skipped: usize,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }
}

/// Read and transition side of the `sync_queue` table.
///
/// Rows are appended by `EntityRepository` inside its write transactions;
/// this type never inserts on its own.
#[derive(Clone)]
pub struct SyncQueue {
    storage: Arc<dyn StorageEngine>,
    max_retry: u32,
    batch_size: u32,
}

impl SyncQueue {
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        Self {
            storage,
            max_retry: DEFAULT_MAX_RETRY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn from_config(storage: Arc<dyn StorageEngine>, config: &SyncConfig) -> Self {
        Self::new(storage)
            .with_max_retry(config.max_retry)
            .with_batch_size(config.batch_size)
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Items pushed by a `replay` call that passes no explicit limit.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub(crate) fn enqueue_statement(
        entity_type: &str,
        entity_id: &EntityId,
        operation: SyncOperation,
        snapshot: &Map<String, Value>,
        created_at: i64,
    ) -> Statement {
        Statement::new(
            r#"
            INSERT INTO sync_queue (entity_type, entity_id, operation, data, created_at, retry_count, status)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, 'PENDING')
            "#,
            vec![
                SqlValue::from(entity_type),
                SqlValue::from(entity_id.as_str()),
                SqlValue::from(operation.as_str()),
                SqlValue::Text(Value::Object(snapshot.clone()).to_string()),
                SqlValue::from(created_at),
            ],
        )
    }

    /// Replayable items in replay order.
    ///
    /// An entity whose earlier item is in flight or has exhausted its retries
    /// is held back entirely, so later mutations never overtake it.
    pub async fn pending(&self, limit: Option<u32>) -> Result<Vec<SyncQueueItem>, StorageError> {
        let result = self
            .storage
            .execute_query(
                r#"
                SELECT q.* FROM sync_queue q
                WHERE (q.status = 'PENDING' OR (q.status = 'FAILED' AND q.retry_count < ?1))
                  AND NOT EXISTS (
                    SELECT 1 FROM sync_queue b
                    WHERE b.entity_type = q.entity_type
                      AND b.entity_id = q.entity_id
                      AND (b.status = 'IN_PROGRESS' OR (b.status = 'FAILED' AND b.retry_count >= ?1))
                      AND (b.created_at, b.id) < (q.created_at, q.id)
                  )
                ORDER BY q.created_at ASC, q.id ASC
                LIMIT ?2
                "#,
                &[
                    SqlValue::from(self.max_retry),
                    SqlValue::from(limit.map(i64::from).unwrap_or(-1)),
                ],
            )
            .await?;

        result.rows.into_iter().map(decode_item).collect()
    }

    pub async fn pending_by_entity_type(
        &self,
        limit: Option<u32>,
    ) -> Result<BTreeMap<String, Vec<SyncQueueItem>>, StorageError> {
        let mut grouped: BTreeMap<String, Vec<SyncQueueItem>> = BTreeMap::new();
        for item in self.pending(limit).await? {
            grouped.entry(item.entity_type.clone()).or_default().push(item);
        }
        Ok(grouped)
    }

    /// Full history of one entity, oldest first.
    pub async fn items_for_entity(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
    ) -> Result<Vec<SyncQueueItem>, StorageError> {
        let rows = self
            .storage
            .select(
                "sync_queue",
                &[],
                Some("entity_type = ? AND entity_id = ?"),
                &[SqlValue::from(entity_type), SqlValue::from(entity_id.as_str())],
                Some("created_at ASC, id ASC"),
                None,
            )
            .await?;

        rows.into_iter().map(decode_item).collect()
    }

    pub async fn list(
        &self,
        status: Option<&SyncStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<SyncQueueItem>, StorageError> {
        let (where_clause, params) = match status {
            Some(status) => (Some("status = ?"), vec![SqlValue::from(status.as_str())]),
            None => (None, Vec::new()),
        };
        let rows = self
            .storage
            .select(
                "sync_queue",
                &[],
                where_clause,
                &params,
                Some("created_at ASC, id ASC"),
                limit,
            )
            .await?;

        rows.into_iter().map(decode_item).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<SyncQueueItem>, StorageError> {
        let rows = self
            .storage
            .select(
                "sync_queue",
                &[],
                Some("id = ?"),
                &[SqlValue::from(id)],
                None,
                Some(1),
            )
            .await?;

        rows.into_iter().next().map(decode_item).transpose()
    }

    /// Claims an item for replay. Returns `false` unless it is PENDING, or
    /// FAILED with retries left.
    pub async fn mark_in_progress(&self, id: i64) -> Result<bool, StorageError> {
        self.transition(
            r#"
            UPDATE sync_queue SET status = 'IN_PROGRESS'
            WHERE id = ?1
              AND (status = 'PENDING' OR (status = 'FAILED' AND retry_count < ?2))
            "#,
            vec![SqlValue::from(id), SqlValue::from(self.max_retry)],
        )
        .await
    }

    pub async fn mark_completed(&self, id: i64) -> Result<bool, StorageError> {
        self.transition(
            "UPDATE sync_queue SET status = 'COMPLETED', last_error = NULL WHERE id = ?1",
            vec![SqlValue::from(id)],
        )
        .await
    }

    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<bool, StorageError> {
        self.transition(
            r#"
            UPDATE sync_queue
            SET status = 'FAILED', retry_count = retry_count + 1, last_error = ?2
            WHERE id = ?1
            "#,
            vec![SqlValue::from(id), SqlValue::from(error)],
        )
        .await
    }

    /// Returns items left IN_PROGRESS by an interrupted replay to PENDING.
    pub async fn reset_in_progress(&self) -> Result<u64, StorageError> {
        let result = self
            .storage
            .execute_query(
                "UPDATE sync_queue SET status = 'PENDING' WHERE status = 'IN_PROGRESS'",
                &[],
            )
            .await?;
        if result.rows_affected > 0 {
            info!("Reset {} in-progress sync items", result.rows_affected);
        }
        Ok(result.rows_affected)
    }

    pub async fn remove(&self, id: i64) -> Result<bool, StorageError> {
        let removed = self
            .storage
            .delete("sync_queue", "id = ?", &[SqlValue::from(id)])
            .await?;
        Ok(removed > 0)
    }

    pub async fn purge_completed(&self) -> Result<u64, StorageError> {
        let removed = self
            .storage
            .delete("sync_queue", "status = ?", &[SqlValue::from("COMPLETED")])
            .await?;
        debug!(removed, "purged completed sync items");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<SyncQueueStats, StorageError> {
        let result = self
            .storage
            .execute_query(
                "SELECT status, COUNT(*) AS count FROM sync_queue GROUP BY status",
                &[],
            )
            .await?;

        let mut stats = SyncQueueStats::default();
        for row in &result.rows {
            let count = row.get("count").and_then(Value::as_u64).unwrap_or(0);
            let status = row
                .get("status")
                .and_then(Value::as_str)
                .map(SyncStatus::from);
            match status {
                Some(SyncStatus::Pending) => stats.pending += count,
                Some(SyncStatus::InProgress) => stats.in_progress += count,
                Some(SyncStatus::Completed) => stats.completed += count,
                Some(SyncStatus::Failed) => stats.failed += count,
                other => warn!("Unexpected sync_queue status: {:?}", other),
            }
        }
        Ok(stats)
    }

    /// Pushes up to `limit` replayable items through `transport`, in order.
    /// Without a limit, one batch of `batch_size` items is pushed.
    ///
    /// Once an item fails, the remaining items of the same entity in this
    /// batch are skipped so that per-entity ordering holds.
    pub async fn replay(
        &self,
        transport: &dyn SyncTransport,
        limit: Option<u32>,
    ) -> Result<ReplayReport, StorageError> {
        let items = self
            .pending(Some(limit.unwrap_or(self.batch_size)))
            .await?;
        let mut report = ReplayReport::default();
        let mut blocked: HashSet<(String, EntityId)> = HashSet::new();

        for item in items {
            let key = (item.entity_type.clone(), item.entity_id.clone());
            if blocked.contains(&key) {
                report.skipped += 1;
                continue;
            }
            if !self.mark_in_progress(item.id).await? {
                blocked.insert(key);
                report.skipped += 1;
                continue;
            }

            debug!(
                queue_id = item.id,
                entity_type = %item.entity_type,
                entity_id = %item.entity_id,
                method = item.operation.http_method(),
                "replaying sync item"
            );

            match transport.push(&item).await {
                Ok(server_version) => {
                    self.mark_completed(item.id).await?;
                    report.acknowledgements.push(SyncAcknowledgement {
                        queue_id: item.id,
                        entity_type: item.entity_type.clone(),
                        entity_id: item.entity_id.clone(),
                        local_version: item.snapshot_version(),
                        server_version,
                    });
                }
                Err(err) => {
                    warn!(
                        queue_id = item.id,
                        entity_type = %item.entity_type,
                        entity_id = %item.entity_id,
                        retry_count = item.retry_count + 1,
                        "Sync replay failed: {}",
                        err
                    );
                    let message = err.to_string();
                    self.mark_failed(item.id, &message).await?;
                    report.failures.push(ReplayFailure {
                        queue_id: item.id,
                        entity_type: item.entity_type.clone(),
                        entity_id: item.entity_id.clone(),
                        local_version: item.snapshot_version(),
                        error: message,
                    });
                    blocked.insert(key);
                }
            }
        }

        info!(
            "Sync replay finished: {} acknowledged, {} failed, {} skipped",
            report.acknowledgements.len(),
            report.failures.len(),
            report.skipped
        );
        Ok(report)
    }

    async fn transition(&self, sql: &str, params: Vec<SqlValue>) -> Result<bool, StorageError> {
        let result = self.storage.execute_query(sql, &params).await?;
        Ok(result.rows_affected > 0)
    }
}

fn decode_item(row: Row) -> Result<SyncQueueItem, StorageError> {
    let data = serde_json::from_str(text_column(&row, "data")?).map_err(|e| {
        StorageError::Decode {
            column: "data".to_string(),
            message: e.to_string(),
        }
    })?;
    let entity_id = EntityId::try_from(text_column(&row, "entity_id")?).map_err(|e| {
        StorageError::Decode {
            column: "entity_id".to_string(),
            message: e.to_string(),
        }
    })?;
    let operation = SyncOperation::from_str(text_column(&row, "operation")?).map_err(|e| {
        StorageError::Decode {
            column: "operation".to_string(),
            message: e.to_string(),
        }
    })?;
    let retry_count = u32::try_from(int_column(&row, "retry_count")?).map_err(|e| {
        StorageError::Decode {
            column: "retry_count".to_string(),
            message: e.to_string(),
        }
    })?;
    let last_error = row
        .get("last_error")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(SyncQueueItem {
        id: int_column(&row, "id")?,
        entity_type: text_column(&row, "entity_type")?.to_string(),
        entity_id,
        operation,
        data,
        created_at: int_column(&row, "created_at")?,
        retry_count,
        status: SyncStatus::from(text_column(&row, "status")?),
        last_error,
    })
}

fn text_column<'a>(row: &'a Row, column: &str) -> Result<&'a str, StorageError> {
    row.get(column)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(column))
}

fn int_column(row: &Row, column: &str) -> Result<i64, StorageError> {
    row.get(column)
        .and_then(Value::as_i64)
        .ok_or_else(|| missing(column))
}

fn missing(column: &str) -> StorageError {
    StorageError::Decode {
        column: column.to_string(),
        message: "missing or mistyped value".to_string(),
    }
}
