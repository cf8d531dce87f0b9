use std::sync::Arc;

use offline_store::{EntityRepository, EntitySchema, SqliteStorage, StorageEngine, SyncEntity, SyncQueue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub name: String,
    pub tags: Vec<String>,
}

impl Widget {
    pub fn new(name: &str, tags: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl SyncEntity for Widget {
    const SCHEMA: EntitySchema = EntitySchema {
        entity_type: "widget",
        table: "widgets",
        create_table_sql: r#"
            CREATE TABLE IF NOT EXISTS widgets (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                local_version INTEGER NOT NULL DEFAULT 1,
                server_version INTEGER,
                sync_status TEXT NOT NULL DEFAULT 'PENDING'
            )
        "#,
        indexes: &["CREATE INDEX IF NOT EXISTS idx_widgets_sync_status ON widgets(sync_status)"],
        structured_fields: &["tags"],
        boolean_fields: &[],
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub credit_limit: i64,
    pub is_vip: bool,
}

impl SyncEntity for Customer {
    const SCHEMA: EntitySchema = EntitySchema {
        entity_type: "customer",
        table: "customers",
        create_table_sql: r#"
            CREATE TABLE IF NOT EXISTS customers (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                phone TEXT,
                address TEXT,
                credit_limit INTEGER NOT NULL DEFAULT 0,
                is_vip INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                local_version INTEGER NOT NULL DEFAULT 1,
                server_version INTEGER,
                sync_status TEXT NOT NULL DEFAULT 'PENDING'
            )
        "#,
        indexes: &[],
        structured_fields: &["address"],
        boolean_fields: &["is_vip"],
    };
}

pub struct StoreTestContext {
    pub storage: Arc<SqliteStorage>,
    pub widgets: EntityRepository<Widget>,
    pub customers: EntityRepository<Customer>,
    pub queue: SyncQueue,
}

pub async fn setup_store() -> StoreTestContext {
    let storage = Arc::new(SqliteStorage::in_memory());
    storage.initialize().await.expect("in-memory sqlite");
    build_context(storage).await
}

#[allow(dead_code)]
pub async fn setup_store_at(database_url: &str) -> StoreTestContext {
    let storage = Arc::new(SqliteStorage::new(database_url));
    storage.initialize().await.expect("file sqlite");
    build_context(storage).await
}

async fn build_context(storage: Arc<SqliteStorage>) -> StoreTestContext {
    let widgets = EntityRepository::<Widget>::new(storage.clone());
    widgets.initialize().await.expect("widgets table");
    let customers = EntityRepository::<Customer>::new(storage.clone());
    customers.initialize().await.expect("customers table");

    StoreTestContext {
        queue: SyncQueue::new(storage.clone()),
        storage,
        widgets,
        customers,
    }
}
