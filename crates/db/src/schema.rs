use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Default embedding dimensionality, used until a query against the
/// embedder's `/info` endpoint overrides it.
pub const DEFAULT_VECTOR_DIM: usize = 768;

/// Schema for the `chunks` table: one row per indexed text chunk.
pub fn chunks_schema(vector_dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("path", DataType::Utf8, false),
    Field::new("mtime", DataType::Int64, false),
    Field::new("page", DataType::Int64, false),
    Field::new("offset", DataType::Int64, false),
    Field::new("text", DataType::Utf8, false),
    Field::new("type", DataType::Utf8, false),
    Field::new("title", DataType::Utf8, false),
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), vector_dim as i32),
      true,
    ),
  ]))
}

/// Schema for the `file_status` table: one row per watched file.
pub fn file_status_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("path", DataType::Utf8, false),
    Field::new("status", DataType::Utf8, false),
    Field::new("parser_version", DataType::Int64, false),
    Field::new("chunk_count", DataType::Int64, false),
    Field::new("error_message", DataType::Utf8, false),
    Field::new("last_modified", DataType::Utf8, false),
    Field::new("indexed_at", DataType::Utf8, false),
    Field::new("file_hash", DataType::Utf8, false),
    Field::new("last_retry", DataType::Utf8, false),
    Field::new("failure_count", DataType::Int64, false),
  ]))
}

/// Schema for the `_schema_meta` table: tracks the store's schema version
/// and the vector dimensionality it was created with, so a dimension or
/// version change can be detected and the store rebuilt.
pub fn schema_meta_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("version", DataType::Int64, false),
    Field::new("vector_dim", DataType::Int64, false),
    Field::new("updated_at", DataType::Utf8, false),
  ]))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chunks_schema_has_vector_column_sized_to_dim() {
    let schema = chunks_schema(4);
    let field = schema.field_with_name("vector").unwrap();
    match field.data_type() {
      DataType::FixedSizeList(_, n) => assert_eq!(*n, 4),
      other => panic!("unexpected type: {other:?}"),
    }
  }

  #[test]
  fn file_status_schema_has_no_vector_column() {
    let schema = file_status_schema();
    assert!(schema.field_with_name("vector").is_err());
  }
}
