//! LanceDB connection and housekeeping helpers.
//!
//! Opening a database, creating missing tables without touching existing
//! ones, and a small key/value `meta` table holding the schema version.

use anyhow::Result;
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;
use tracing::{debug, info};

use crate::schema::{
    build_collections_schema, build_experiments_schema, build_meta_schema, COLLECTIONS_TABLE, EXPERIMENTS_TABLE, META_TABLE,
    SCHEMA_VERSION,
};

pub async fn open_db(uri: &str) -> Result<Connection> { Ok(connect(uri).execute().await?) }

/// Create `name` with `schema` and zero rows unless it already exists.
/// Returns whether the table was created.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    if names.iter().any(|n| n == name) {
        return Ok(false);
    }
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    debug!(table = name, "created table");
    Ok(true)
}

/// Bring a database up to [`SCHEMA_VERSION`]: every record kind gets its
/// table, existing tables and rows are left alone.
pub async fn upgrade_schema(conn: &Connection) -> Result<u32> {
    ensure_table(conn, META_TABLE, build_meta_schema()).await?;
    let current: u32 = get_meta(conn, META_TABLE, "schema_version").await?.and_then(|v| v.parse().ok()).unwrap_or(0);
    ensure_table(conn, COLLECTIONS_TABLE, build_collections_schema()).await?;
    ensure_table(conn, EXPERIMENTS_TABLE, build_experiments_schema()).await?;
    if current < SCHEMA_VERSION {
        set_meta(conn, META_TABLE, "schema_version", &SCHEMA_VERSION.to_string()).await?;
        info!(from = current, to = SCHEMA_VERSION, "upgraded store schema");
    }
    Ok(SCHEMA_VERSION.max(current))
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_table(conn, table, build_meta_schema()).await?;
    let t = conn.open_table(table).execute().await?;
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    // key is unique: upsert
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    let names = conn.table_names().execute().await?;
    if !names.iter().any(|n| n == table) {
        return Ok(None);
    }
    let t = conn.open_table(table).execute().await?;
    let mut stream = t.query().only_if(format!("key = '{}'", quote(key))).execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        if batch.num_rows() == 0 {
            continue;
        }
        let val = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("meta.value column missing"))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

/// Escape a value for a single-quoted SQL literal.
pub fn quote(value: &str) -> String { value.replace('\'', "''") }
