//! Conversion between entity documents and storage rows.

use crate::application::ports::{Row, SqlValue};
use crate::application::services::RepositoryError;
use crate::domain::entities::EntitySchema;
use serde::Serialize;
use serde_json::{Map, Value};

pub(crate) fn to_document<S: Serialize>(value: &S) -> Result<Map<String, Value>, RepositoryError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(RepositoryError::InvalidEntity(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Column/value pairs for a document. Structured fields become JSON text;
/// an object or array in an undeclared field is rejected.
pub(crate) fn encode(
    schema: &EntitySchema,
    document: &Map<String, Value>,
) -> Result<Vec<(String, SqlValue)>, RepositoryError> {
    document
        .iter()
        .map(|(field, value)| {
            let encoded = if schema.is_structured(field) {
                match value {
                    Value::Null => SqlValue::Null,
                    other => SqlValue::Text(other.to_string()),
                }
            } else if value.is_object() || value.is_array() {
                return Err(RepositoryError::InvalidEntity(format!(
                    "field {field} of {} holds structured data but is not declared structured",
                    schema.entity_type
                )));
            } else {
                SqlValue::from_json(value)
            };
            Ok((field.clone(), encoded))
        })
        .collect()
}

/// Inverse of [`encode`] for a row read back from the entity table.
pub(crate) fn decode(schema: &EntitySchema, row: Row) -> Result<Map<String, Value>, RepositoryError> {
    let mut document = Map::with_capacity(row.len());
    for (field, value) in row {
        let decoded = if schema.is_structured(&field) {
            match value {
                Value::String(text) => {
                    serde_json::from_str(&text).map_err(|source| RepositoryError::Decode {
                        field: field.clone(),
                        source,
                    })?
                }
                other => other,
            }
        } else if schema.is_boolean(&field) {
            match value {
                Value::Null if field == "is_deleted" => Value::Bool(false),
                Value::Number(n) => Value::Bool(n.as_i64().unwrap_or(0) != 0),
                other => other,
            }
        } else if field == "local_version" && value.is_null() {
            Value::from(0)
        } else {
            value
        };
        document.insert(field, decoded);
    }
    Ok(document)
}
