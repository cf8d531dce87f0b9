use crate::application::ports::StorageEngine;
use crate::application::services::{EntityRepository, SyncQueue};
use crate::domain::entities::{EntitySchema, SyncEntity};
use crate::infrastructure::database::SqliteStorage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Product {
    pub name: String,
    pub price: f64,
    pub tags: Vec<String>,
    pub attributes: Value,
    pub active: bool,
    pub on_sale: Option<bool>,
}

impl Product {
    pub(crate) fn new(name: &str, price: f64) -> Self {
        Self {
            name: name.to_string(),
            price,
            tags: Vec::new(),
            attributes: Value::Null,
            active: true,
            on_sale: None,
        }
    }
}

impl SyncEntity for Product {
    const SCHEMA: EntitySchema = EntitySchema {
        entity_type: "product",
        table: "products",
        create_table_sql: r#"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                price REAL NOT NULL,
                tags TEXT,
                attributes TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                on_sale INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                local_version INTEGER NOT NULL DEFAULT 1,
                server_version INTEGER,
                sync_status TEXT NOT NULL DEFAULT 'PENDING'
            )
        "#,
        indexes: &["CREATE INDEX IF NOT EXISTS idx_products_name ON products(name)"],
        structured_fields: &["tags", "attributes"],
        boolean_fields: &["active", "on_sale"],
    };
}

pub(crate) async fn memory_storage() -> Arc<SqliteStorage> {
    let storage = Arc::new(SqliteStorage::in_memory());
    storage.initialize().await.unwrap();
    storage
}

pub(crate) async fn product_repository() -> (Arc<SqliteStorage>, EntityRepository<Product>) {
    let storage = memory_storage().await;
    let repository = EntityRepository::<Product>::new(storage.clone());
    repository.initialize().await.unwrap();
    (storage, repository)
}

pub(crate) fn queue_for(storage: &Arc<SqliteStorage>) -> SyncQueue {
    SyncQueue::new(storage.clone())
}
