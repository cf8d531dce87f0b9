use crate::application::ports::{QueryResult, Row, SqlValue, StorageError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::TryStreamExt;
use serde_json::{Map, Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Either, Executor, Row as _, Sqlite, TypeInfo, ValueRef};

pub(crate) fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(value) => query.bind(*value),
            SqlValue::Real(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.clone()),
            SqlValue::Blob(value) => query.bind(value.clone()),
        };
    }
    query
}

/// Runs one statement on any SQLite executor (pool or open transaction).
///
/// Rows and the execution summary are both collected from the driver, so the
/// result set does not depend on how the statement is written.
pub(crate) async fn run_statement<'c, E>(
    executor: E,
    sql: &'c str,
    params: &[SqlValue],
) -> Result<QueryResult, StorageError>
where
    E: Executor<'c, Database = Sqlite> + 'c,
{
    let query = bind_params(sqlx::query(sql), params);
    let mut stream = executor.fetch_many(query);

    let mut result = QueryResult {
        rows: Vec::new(),
        rows_affected: 0,
        last_insert_id: None,
    };
    while let Some(step) = stream
        .try_next()
        .await
        .map_err(|e| StorageError::query(sql, e))?
    {
        match step {
            Either::Left(done) => {
                result.rows_affected += done.rows_affected();
                if done.rows_affected() > 0 {
                    result.last_insert_id = Some(done.last_insert_rowid());
                }
            }
            Either::Right(row) => result.rows.push(decode_row(&row)?),
        }
    }
    Ok(result)
}

pub(crate) fn decode_row(row: &SqliteRow) -> Result<Row, StorageError> {
    let mut map = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let decode_err = |e: sqlx::Error| StorageError::Decode {
            column: name.to_string(),
            message: e.to_string(),
        };

        let storage_class = {
            let raw = row.try_get_raw(index).map_err(decode_err)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match storage_class.as_deref() {
            None | Some("NULL") => Value::Null,
            Some("INTEGER") | Some("BOOLEAN") => {
                Value::from(row.try_get_unchecked::<i64, _>(index).map_err(decode_err)?)
            }
            Some("REAL") | Some("NUMERIC") => {
                let real = row.try_get_unchecked::<f64, _>(index).map_err(decode_err)?;
                Number::from_f64(real).map(Value::Number).unwrap_or(Value::Null)
            }
            Some("BLOB") => {
                let bytes = row
                    .try_get_unchecked::<Vec<u8>, _>(index)
                    .map_err(decode_err)?;
                Value::String(STANDARD.encode(bytes))
            }
            Some(_) => Value::String(
                row.try_get_unchecked::<String, _>(index)
                    .map_err(decode_err)?,
            ),
        };
        map.insert(name.to_string(), value);
    }
    Ok(map)
}

/// Leading keyword, skipping whitespace and comments.
fn first_keyword(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            break;
        }
        rest = rest.trim_start();
    }
    rest.split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// Statements that cannot modify the database skip the writer lock.
/// Anything unrecognised is treated as a write.
pub(crate) fn is_read_only(sql: &str) -> bool {
    match first_keyword(sql).as_str() {
        "SELECT" | "EXPLAIN" => true,
        "PRAGMA" => !sql.contains('='),
        _ => false,
    }
}
