use super::StorageError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A result row keyed by column name.
pub type Row = Map<String, Value>;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Maps a JSON scalar onto the closest storage class. Arrays and objects
    /// are stored as JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
            Value::Number(number) => match number.as_i64() {
                Some(int) => SqlValue::Integer(int),
                None => number
                    .as_f64()
                    .map(SqlValue::Real)
                    .unwrap_or_else(|| SqlValue::Text(number.to_string())),
            },
            Value::String(text) => SqlValue::Text(text.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One entry of a transactional batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
    /// Abort the whole batch when this statement touches no rows.
    pub expect_changes: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
            expect_changes: false,
        }
    }

    pub fn expect_changes(mut self) -> Self {
        self.expect_changes = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

impl ColumnInfo {
    fn from_row(row: &Row) -> Result<Self, StorageError> {
        let name = row
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| StorageError::Decode {
                column: "name".to_string(),
                message: "missing column name in table_info".to_string(),
            })?;
        let default_value = match row.get("dflt_value") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        };

        Ok(Self {
            cid: row.get("cid").and_then(Value::as_i64).unwrap_or_default(),
            name: name.to_string(),
            data_type: row
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            not_null: row.get("notnull").and_then(Value::as_i64).unwrap_or(0) != 0,
            default_value,
            primary_key: row.get("pk").and_then(Value::as_i64).unwrap_or(0) != 0,
        })
    }
}

/// Thin transactional interface over an embedded SQL database.
///
/// Implementations provide the four primitive operations; the statement
/// builders are shared default methods.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Opens the database and creates the `sync_queue` table. Calling it on a
    /// ready engine is a no-op.
    async fn initialize(&self) -> Result<(), StorageError>;

    async fn close(&self);

    async fn execute_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, StorageError>;

    /// Runs every statement atomically; results come back in input order.
    async fn execute_transaction(
        &self,
        statements: Vec<Statement>,
    ) -> Result<Vec<QueryResult>, StorageError>;

    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        where_clause: Option<&str>,
        params: &[SqlValue],
        order_by: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Row>, StorageError> {
        let sql = select_sql(table, columns, where_clause, order_by, limit)?;
        Ok(self.execute_query(&sql, params).await?.rows)
    }

    /// Returns the id of the inserted row.
    async fn insert(&self, table: &str, data: &[(String, SqlValue)]) -> Result<i64, StorageError> {
        let statement = insert_statement(table, data)?;
        let result = self
            .execute_query(&statement.sql, &statement.params)
            .await?;
        Ok(result.last_insert_id.unwrap_or_default())
    }

    /// Returns the number of updated rows.
    async fn update(
        &self,
        table: &str,
        data: &[(String, SqlValue)],
        where_clause: &str,
        params: &[SqlValue],
    ) -> Result<u64, StorageError> {
        let statement = update_statement(table, data, where_clause, params)?;
        let result = self
            .execute_query(&statement.sql, &statement.params)
            .await?;
        Ok(result.rows_affected)
    }

    /// Returns the number of deleted rows.
    async fn delete(
        &self,
        table: &str,
        where_clause: &str,
        params: &[SqlValue],
    ) -> Result<u64, StorageError> {
        let statement = delete_statement(table, where_clause, params)?;
        let result = self
            .execute_query(&statement.sql, &statement.params)
            .await?;
        Ok(result.rows_affected)
    }

    async fn table_exists(&self, name: &str) -> Result<bool, StorageError> {
        let result = self
            .execute_query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                &[SqlValue::from(name)],
            )
            .await?;
        Ok(!result.rows.is_empty())
    }

    async fn table_schema(&self, name: &str) -> Result<Vec<ColumnInfo>, StorageError> {
        validate_identifier(name)?;
        let result = self
            .execute_query(
                r#"SELECT cid, name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
                &[SqlValue::from(name)],
            )
            .await?;
        result.rows.iter().map(ColumnInfo::from_row).collect()
    }
}

/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<(), StorageError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

pub fn select_sql(
    table: &str,
    columns: &[&str],
    where_clause: Option<&str>,
    order_by: Option<&str>,
    limit: Option<u32>,
) -> Result<String, StorageError> {
    validate_identifier(table)?;
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        for column in columns {
            validate_identifier(column)?;
        }
        columns.join(", ")
    };

    let mut sql = format!("SELECT {projection} FROM {table}");
    if let Some(clause) = where_clause.filter(|c| !c.trim().is_empty()) {
        sql.push_str(&format!(" WHERE {clause}"));
    }
    if let Some(order) = order_by.filter(|o| !o.trim().is_empty()) {
        sql.push_str(&format!(" ORDER BY {order}"));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(sql)
}

pub fn insert_statement(
    table: &str,
    data: &[(String, SqlValue)],
) -> Result<Statement, StorageError> {
    validate_identifier(table)?;
    let mut columns = Vec::with_capacity(data.len());
    let mut placeholders = Vec::with_capacity(data.len());
    let mut params = Vec::with_capacity(data.len());
    for (index, (column, value)) in data.iter().enumerate() {
        validate_identifier(column)?;
        columns.push(column.as_str());
        placeholders.push(format!("?{}", index + 1));
        params.push(value.clone());
    }

    let sql = if columns.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
        format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    Ok(Statement::new(sql, params))
}

/// `where_clause` uses positional `?` placeholders; its params are bound
/// after the SET values.
pub fn update_statement(
    table: &str,
    data: &[(String, SqlValue)],
    where_clause: &str,
    params: &[SqlValue],
) -> Result<Statement, StorageError> {
    validate_identifier(table)?;
    if data.is_empty() {
        return Err(StorageError::InvalidStatement(format!(
            "update of {table} without columns"
        )));
    }

    let mut assignments = Vec::with_capacity(data.len());
    let mut bound = Vec::with_capacity(data.len() + params.len());
    for (column, value) in data {
        validate_identifier(column)?;
        assignments.push(format!("{column} = ?"));
        bound.push(value.clone());
    }
    bound.extend(params.iter().cloned());

    let sql = format!(
        "UPDATE {table} SET {} WHERE {where_clause}",
        assignments.join(", ")
    );
    Ok(Statement::new(sql, bound))
}

pub fn delete_statement(
    table: &str,
    where_clause: &str,
    params: &[SqlValue],
) -> Result<Statement, StorageError> {
    validate_identifier(table)?;
    Ok(Statement::new(
        format!("DELETE FROM {table} WHERE {where_clause}"),
        params.to_vec(),
    ))
}
