/// Storage layout of one entity type.
///
/// The table named here must carry the metadata columns listed in
/// [`METADATA_FIELDS`](super::METADATA_FIELDS) next to the domain columns.
/// Structured fields are always stored as JSON text, boolean fields as 0/1;
/// every other field is stored as the scalar it serializes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    /// Tag written to `sync_queue.entity_type`.
    pub entity_type: &'static str,
    pub table: &'static str,
    pub create_table_sql: &'static str,
    pub indexes: &'static [&'static str],
    pub structured_fields: &'static [&'static str],
    pub boolean_fields: &'static [&'static str],
}

impl EntitySchema {
    pub fn is_structured(&self, field: &str) -> bool {
        self.structured_fields.contains(&field)
    }

    pub fn is_boolean(&self, field: &str) -> bool {
        field == "is_deleted" || self.boolean_fields.contains(&field)
    }
}
