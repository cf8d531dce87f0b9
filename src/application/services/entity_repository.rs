mod codec;


use super::sync_queue::{ReplayReport, SyncAcknowledgement, SyncQueue};
use super::{now_ms, RepositoryError};
use crate::application::ports::{
    insert_statement, update_statement, validate_identifier, Row, SqlValue, Statement,
    StorageEngine, StorageError,
};
use crate::domain::entities::{EntitySchema, SyncEntity, SyncMetadata, Synced, METADATA_FIELDS};
use crate::domain::value_objects::{EntityId, SyncOperation};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NOT_DELETED: &str = "(is_deleted = 0 OR is_deleted IS NULL)";

/// CRUD over one entity table with soft-delete, optimistic versioning and
/// automatic sync queue entries.
pub struct EntityRepository<T: SyncEntity> {
    storage: Arc<dyn StorageEngine>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: SyncEntity> Clone for EntityRepository<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            _entity: PhantomData,
        }
    }
}

impl<T: SyncEntity> EntityRepository<T> {
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        Self {
            storage,
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> EntitySchema {
        T::SCHEMA
    }

    /// Creates the entity table and its indexes, initializing storage first
    /// if needed.
    pub async fn initialize(&self) -> Result<(), RepositoryError> {
        let schema = T::SCHEMA;
        validate_identifier(schema.table)?;
        self.storage.initialize().await?;

        let mut statements = vec![Statement::new(schema.create_table_sql, Vec::new())];
        statements.extend(
            schema
                .indexes
                .iter()
                .map(|sql| Statement::new(*sql, Vec::new())),
        );
        self.storage.execute_transaction(statements).await?;

        info!("Entity table ready: {}", schema.table);
        Ok(())
    }

    pub async fn create(&self, data: T) -> Result<Synced<T>, RepositoryError> {
        self.create_with_id(EntityId::generate(), data).await
    }

    pub async fn create_with_id(&self, id: EntityId, data: T) -> Result<Synced<T>, RepositoryError> {
        let schema = T::SCHEMA;
        let now = now_ms();
        let record = Synced {
            meta: SyncMetadata::new(id, now),
            data,
        };

        let document = codec::to_document(&record)?;
        let row = codec::encode(&schema, &document)?;
        let statements = vec![
            insert_statement(schema.table, &row)?,
            SyncQueue::enqueue_statement(
                schema.entity_type,
                record.id(),
                SyncOperation::Create,
                &document,
                now,
            ),
        ];

        match self.storage.execute_transaction(statements).await {
            Ok(_) => {}
            Err(err) if err.is_unique_violation_on(&format!("{}.id", schema.table)) => {
                return Err(RepositoryError::AlreadyExists {
                    entity_type: schema.entity_type,
                    id: record.id().to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        debug!(entity_type = schema.entity_type, id = %record.id(), "entity created");
        Ok(record)
    }

    /// Merges `patch` (a JSON object of domain fields) onto the stored entity.
    /// Keys the entity does not have are rejected rather than dropped.
    pub async fn update(&self, id: &EntityId, patch: Value) -> Result<Synced<T>, RepositoryError> {
        let Value::Object(patch) = patch else {
            return Err(RepositoryError::InvalidPatch(
                "patch must be a JSON object".to_string(),
            ));
        };
        for (key, value) in &patch {
            let is_same_id = key == "id" && value.as_str() == Some(id.as_str());
            if METADATA_FIELDS.contains(&key.as_str()) && !is_same_id {
                return Err(RepositoryError::InvalidPatch(format!(
                    "{key} is managed by the repository"
                )));
            }
        }

        let existing = self.require_active(id).await?;
        let expected_version = existing.meta.local_version;

        let mut document = codec::to_document(&existing)?;
        if let Some(unknown) = patch
            .keys()
            .find(|key| key.as_str() != "id" && !document.contains_key(key.as_str()))
        {
            return Err(RepositoryError::InvalidPatch(format!(
                "{unknown} is not a field of {}",
                T::SCHEMA.entity_type
            )));
        }
        document.extend(patch.into_iter().filter(|(key, _)| key != "id"));
        let merged: Synced<T> = serde_json::from_value(Value::Object(document))?;
        let record = Synced {
            meta: existing.meta,
            data: merged.data,
        };

        self.write_mutation(expected_version, record, SyncOperation::Update)
            .await
    }

    /// Typed counterpart of [`update`](Self::update).
    pub async fn update_with<F>(&self, id: &EntityId, mutate: F) -> Result<Synced<T>, RepositoryError>
    where
        F: FnOnce(&mut T) + Send,
    {
        let mut record = self.require_active(id).await?;
        let expected_version = record.meta.local_version;
        mutate(&mut record.data);

        self.write_mutation(expected_version, record, SyncOperation::Update)
            .await
    }

    /// Soft delete. The row stays stored with `is_deleted = true`.
    pub async fn delete(&self, id: &EntityId) -> Result<bool, RepositoryError> {
        let mut record = self.require_active(id).await?;
        let expected_version = record.meta.local_version;
        record.meta.is_deleted = true;

        self.write_mutation(expected_version, record, SyncOperation::Delete)
            .await?;
        Ok(true)
    }

    /// Physically removes the row. Local cleanup only: nothing is queued.
    pub async fn hard_delete(&self, id: &EntityId) -> Result<bool, RepositoryError> {
        let removed = self
            .storage
            .delete(T::SCHEMA.table, "id = ?", &[SqlValue::from(id.as_str())])
            .await?;
        debug!(entity_type = T::SCHEMA.entity_type, id = %id, removed, "entity hard-deleted");
        Ok(removed > 0)
    }

    pub async fn get_by_id(&self, id: &EntityId) -> Result<Option<Synced<T>>, RepositoryError> {
        let rows = self
            .storage
            .select(
                T::SCHEMA.table,
                &[],
                Some(format!("id = ? AND {NOT_DELETED}").as_str()),
                &[SqlValue::from(id.as_str())],
                None,
                Some(1),
            )
            .await?;

        rows.into_iter().next().map(Self::from_row).transpose()
    }

    pub async fn get_all(&self, include_deleted: bool) -> Result<Vec<Synced<T>>, RepositoryError> {
        let where_clause = if include_deleted { None } else { Some(NOT_DELETED) };
        let rows = self
            .storage
            .select(
                T::SCHEMA.table,
                &[],
                where_clause,
                &[],
                Some("created_at ASC, id ASC"),
                None,
            )
            .await?;

        rows.into_iter().map(Self::from_row).collect()
    }

    /// Caller predicate, always restricted to rows that are not soft-deleted.
    pub async fn query(
        &self,
        where_clause: &str,
        params: &[SqlValue],
        order_by: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Synced<T>>, RepositoryError> {
        let where_clause = if where_clause.trim().is_empty() {
            NOT_DELETED.to_string()
        } else {
            format!("({where_clause}) AND {NOT_DELETED}")
        };
        let rows = self
            .storage
            .select(
                T::SCHEMA.table,
                &[],
                Some(where_clause.as_str()),
                params,
                order_by,
                limit,
            )
            .await?;

        rows.into_iter().map(Self::from_row).collect()
    }

    pub async fn count(&self, include_deleted: bool) -> Result<u64, RepositoryError> {
        let table = T::SCHEMA.table;
        validate_identifier(table)?;
        let sql = if include_deleted {
            format!("SELECT COUNT(*) AS count FROM {table}")
        } else {
            format!("SELECT COUNT(*) AS count FROM {table} WHERE {NOT_DELETED}")
        };
        let result = self.storage.execute_query(&sql, &[]).await?;
        let count = result
            .rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(count)
    }

    /// Records a successful replay. `server_version` only ever moves forward,
    /// `local_version` is left alone, and the entity is marked COMPLETED only
    /// when no local mutation happened after the replayed snapshot.
    pub async fn apply_acknowledgement(
        &self,
        ack: &SyncAcknowledgement,
    ) -> Result<bool, RepositoryError> {
        let schema = T::SCHEMA;
        if ack.entity_type != schema.entity_type {
            return Ok(false);
        }
        validate_identifier(schema.table)?;

        let sql = format!(
            r#"
            UPDATE {table}
            SET server_version = CASE
                    WHEN ?1 IS NULL THEN server_version
                    WHEN server_version IS NULL OR server_version < ?1 THEN ?1
                    ELSE server_version
                END,
                sync_status = CASE
                    WHEN COALESCE(local_version, 0) = ?2 THEN 'COMPLETED'
                    ELSE sync_status
                END
            WHERE id = ?3
            "#,
            table = schema.table
        );
        let result = self
            .storage
            .execute_query(
                &sql,
                &[
                    SqlValue::from(ack.server_version),
                    SqlValue::from(ack.local_version),
                    SqlValue::from(ack.entity_id.as_str()),
                ],
            )
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Marks the entity FAILED unless it has been mutated since the snapshot
    /// that failed to replay.
    pub async fn mark_sync_failed(
        &self,
        id: &EntityId,
        snapshot_version: Option<i64>,
    ) -> Result<bool, RepositoryError> {
        let schema = T::SCHEMA;
        validate_identifier(schema.table)?;
        let sql = format!(
            "UPDATE {} SET sync_status = 'FAILED' WHERE id = ?1 AND COALESCE(local_version, 0) = ?2",
            schema.table
        );
        let result = self
            .storage
            .execute_query(
                &sql,
                &[SqlValue::from(id.as_str()), SqlValue::from(snapshot_version)],
            )
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Applies the parts of a replay report that concern this entity type.
    /// Returns the number of entities touched.
    pub async fn apply_replay_report(&self, report: &ReplayReport) -> Result<usize, RepositoryError> {
        let mut touched = 0;
        for ack in &report.acknowledgements {
            if self.apply_acknowledgement(ack).await? {
                touched += 1;
            }
        }
        for failure in report
            .failures
            .iter()
            .filter(|f| f.entity_type == T::SCHEMA.entity_type)
        {
            if self
                .mark_sync_failed(&failure.entity_id, failure.local_version)
                .await?
            {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn require_active(&self, id: &EntityId) -> Result<Synced<T>, RepositoryError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity_type: T::SCHEMA.entity_type,
                id: id.to_string(),
            })
    }

    /// Writes `record` guarded by the version that was read, and queues the
    /// post-mutation snapshot in the same transaction.
    async fn write_mutation(
        &self,
        expected_version: i64,
        record: Synced<T>,
        operation: SyncOperation,
    ) -> Result<Synced<T>, RepositoryError> {
        self.write_mutation_at(expected_version, record, operation, now_ms())
            .await
    }

    /// The queue row is stamped with the bumped `updated_at`, which never moves
    /// backwards, so a clock step cannot order it ahead of earlier mutations.
    async fn write_mutation_at(
        &self,
        expected_version: i64,
        mut record: Synced<T>,
        operation: SyncOperation,
        now: i64,
    ) -> Result<Synced<T>, RepositoryError> {
        let schema = T::SCHEMA;
        record.meta.bump(now);

        let document = codec::to_document(&record)?;
        let row: Vec<(String, SqlValue)> = codec::encode(&schema, &document)?
            .into_iter()
            .filter(|(column, _)| column != "id")
            .collect();

        let statements = vec![
            update_statement(
                schema.table,
                &row,
                "id = ? AND COALESCE(local_version, 0) = ?",
                &[
                    SqlValue::from(record.id().as_str()),
                    SqlValue::from(expected_version),
                ],
            )?
            .expect_changes(),
            SyncQueue::enqueue_statement(
                schema.entity_type,
                record.id(),
                operation,
                &document,
                record.meta.updated_at,
            ),
        ];

        match self.storage.execute_transaction(statements).await {
            Ok(_) => {}
            Err(StorageError::Unchanged { .. }) => {
                warn!(
                    entity_type = schema.entity_type,
                    id = %record.id(),
                    expected_version,
                    "concurrent modification detected"
                );
                return Err(RepositoryError::Conflict {
                    entity_type: schema.entity_type,
                    id: record.id().to_string(),
                    expected_version,
                });
            }
            Err(err) => return Err(err.into()),
        }

        debug!(
            entity_type = schema.entity_type,
            id = %record.id(),
            operation = %operation,
            local_version = record.meta.local_version,
            "entity mutated"
        );
        Ok(record)
    }

    fn from_row(row: Row) -> Result<Synced<T>, RepositoryError> {
        let document = codec::decode(&T::SCHEMA, row)?;
        Ok(serde_json::from_value(Value::Object(document))?)
    }
}
