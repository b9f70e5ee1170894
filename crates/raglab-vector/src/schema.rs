//! Arrow schemas of the store's tables.
//!
//! Collections keep their scalar metadata in typed columns and the chunk
//! list plus vectors as a JSON `payload`, so collections of different
//! dimensionality share one table.

use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const COLLECTIONS_TABLE: &str = "collections";
pub const EXPERIMENTS_TABLE: &str = "experiments";
pub const META_TABLE: &str = "meta";

/// Bumped whenever a table (record kind) is added.
pub const SCHEMA_VERSION: u32 = 2;

fn timestamp_ms() -> DataType { DataType::Timestamp(TimeUnit::Millisecond, None) }

pub fn build_collections_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("created_at", timestamp_ms(), false),
        Field::new("source_file_name", DataType::Utf8, false),
        Field::new("chunk_method", DataType::Utf8, false),
        Field::new("chunk_count", DataType::Int64, false),
        Field::new("payload", DataType::Utf8, false),
    ]))
}

pub fn build_experiments_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("timestamp", timestamp_ms(), false),
        Field::new("processing_time_ms", DataType::Int64, false),
        Field::new("payload", DataType::Utf8, false),
    ]))
}

pub fn build_meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", timestamp_ms(), false),
    ]))
}
