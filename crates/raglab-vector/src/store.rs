//! LanceDB-backed collection store and experiment log.

use anyhow::{anyhow, Context};
use arrow_array::{Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lancedb::query::ExecutableQuery;
use lancedb::{Connection, Table};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use raglab_core::error::{Error, Result};
use raglab_core::traits::{CollectionStore, ExperimentLog};
use raglab_core::types::{Chunk, Experiment, VectorCollection};

use crate::schema::{build_collections_schema, build_experiments_schema, COLLECTIONS_TABLE, EXPERIMENTS_TABLE};
use crate::table::{open_db, quote, upgrade_schema};

#[derive(Serialize)]
struct PayloadRef<'a> {
    chunks: &'a [Chunk],
    vectors: &'a [Vec<f32>],
}

#[derive(Deserialize)]
struct Payload {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

/// Persistent store rooted at a LanceDB directory.
///
/// The connection is opened and the schema upgraded on first use; every
/// later call reuses that connection.
pub struct LanceStore {
    uri: String,
    conn: OnceCell<Connection>,
}

impl LanceStore {
    pub fn new(uri: impl Into<String>) -> Self { Self { uri: uri.into(), conn: OnceCell::new() } }

    pub fn uri(&self) -> &str { &self.uri }

    async fn connection(&self) -> Result<&Connection> {
        self.conn
            .get_or_try_init(|| async {
                let conn = open_db(&self.uri).await?;
                let version = upgrade_schema(&conn).await?;
                info!(uri = %self.uri, version, "store opened");
                Ok::<_, anyhow::Error>(conn)
            })
            .await
            .map_err(|e| Error::store("could not open the store", format!("{e:#}")))
    }

    async fn table(&self, name: &str) -> Result<Table> {
        let conn = self.connection().await?;
        conn.open_table(name)
            .execute()
            .await
            .map_err(|e| Error::store(format!("could not open table '{name}'"), e))
    }
}

#[async_trait]
impl CollectionStore for LanceStore {
    async fn put(&self, collection: &VectorCollection) -> Result<()> {
        collection.validate()?;
        let t = self.table(COLLECTIONS_TABLE).await?;
        let batch = collection_batch(collection).map_err(|e| Error::store("could not encode collection", format!("{e:#}")))?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_collections_schema()));
        let mut mi = t.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader)
            .await
            .map_err(|e| Error::store(format!("could not save collection '{}'", collection.name), e))?;
        debug!(id = %collection.id, chunks = collection.chunk_count, "stored collection");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<VectorCollection>> {
        let t = self.table(COLLECTIONS_TABLE).await?;
        let batches = read_all(&t).await.map_err(|e| Error::store("could not read collections", format!("{e:#}")))?;
        let mut out = Vec::new();
        for batch in &batches {
            let decoded = decode_collections(batch).map_err(|e| Error::store("stored collection is corrupt", format!("{e:#}")))?;
            out.extend(decoded);
        }
        for c in &out {
            c.validate().map_err(|e| Error::store("stored collection is corrupt", e))?;
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let t = self.table(COLLECTIONS_TABLE).await?;
        t.delete(&format!("id = '{}'", quote(id)))
            .await
            .map_err(|e| Error::store(format!("could not delete collection '{id}'"), e))?;
        debug!(id, "deleted collection");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let t = self.table(COLLECTIONS_TABLE).await?;
        t.delete("id IS NOT NULL").await.map_err(|e| Error::store("could not clear collections", e))?;
        warn!("all collections removed");
        Ok(())
    }
}

#[async_trait]
impl ExperimentLog for LanceStore {
    async fn append(&self, experiment: &Experiment) -> Result<()> {
        let t = self.table(EXPERIMENTS_TABLE).await?;
        let batch = experiment_batch(experiment).map_err(|e| Error::store("could not encode experiment", format!("{e:#}")))?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_experiments_schema()));
        t.add(reader).execute().await.map_err(|e| Error::store("could not record experiment", e))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Experiment>> {
        let t = self.table(EXPERIMENTS_TABLE).await?;
        let batches = read_all(&t).await.map_err(|e| Error::store("could not read experiments", format!("{e:#}")))?;
        let mut out = Vec::new();
        for batch in &batches {
            let payload = string_col(batch, "payload").map_err(|e| Error::store("stored experiment is corrupt", e))?;
            for i in 0..batch.num_rows() {
                let exp: Experiment = serde_json::from_str(payload.value(i))
                    .map_err(|e| Error::store("stored experiment is corrupt", e))?;
                out.push(exp);
            }
        }
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

async fn read_all(t: &Table) -> anyhow::Result<Vec<RecordBatch>> {
    let mut stream = t.query().execute().await?;
    let mut batches = Vec::new();
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        batches.push(batch);
    }
    Ok(batches)
}

fn collection_batch(c: &VectorCollection) -> anyhow::Result<RecordBatch> {
    let payload = serde_json::to_string(&PayloadRef { chunks: &c.chunks, vectors: &c.vectors })?;
    let rb = RecordBatch::try_new(
        build_collections_schema(),
        vec![
            Arc::new(StringArray::from(vec![c.id.clone()])),
            Arc::new(StringArray::from(vec![c.name.clone()])),
            Arc::new(TimestampMillisecondArray::from(vec![c.created_at.timestamp_millis()])),
            Arc::new(StringArray::from(vec![c.source_file_name.clone()])),
            Arc::new(StringArray::from(vec![c.chunk_method.as_str().to_string()])),
            Arc::new(Int64Array::from(vec![c.chunk_count as i64])),
            Arc::new(StringArray::from(vec![payload])),
        ],
    )?;
    Ok(rb)
}

fn experiment_batch(e: &Experiment) -> anyhow::Result<RecordBatch> {
    let rb = RecordBatch::try_new(
        build_experiments_schema(),
        vec![
            Arc::new(StringArray::from(vec![e.id.clone()])),
            Arc::new(TimestampMillisecondArray::from(vec![e.timestamp.timestamp_millis()])),
            Arc::new(Int64Array::from(vec![e.processing_time_ms as i64])),
            Arc::new(StringArray::from(vec![serde_json::to_string(e)?])),
        ],
    )?;
    Ok(rb)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("column '{name}' missing or not utf8"))
}

fn decode_collections(batch: &RecordBatch) -> anyhow::Result<Vec<VectorCollection>> {
    let ids = string_col(batch, "id")?;
    let names = string_col(batch, "name")?;
    let files = string_col(batch, "source_file_name")?;
    let methods = string_col(batch, "chunk_method")?;
    let payloads = string_col(batch, "payload")?;
    let created = batch
        .column_by_name("created_at")
        .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
        .ok_or_else(|| anyhow!("column 'created_at' missing"))?;
    let counts = batch
        .column_by_name("chunk_count")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow!("column 'chunk_count' missing"))?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let id = ids.value(i).to_string();
        let payload: Payload =
            serde_json::from_str(payloads.value(i)).with_context(|| format!("decoding payload of collection '{id}'"))?;
        let created_at = if created.is_null(i) { None } else { DateTime::<Utc>::from_timestamp_millis(created.value(i)) }
            .ok_or_else(|| anyhow!("collection '{id}' has an invalid created_at"))?;
        out.push(VectorCollection {
            id,
            name: names.value(i).to_string(),
            created_at,
            source_file_name: files.value(i).to_string(),
            chunk_method: methods.value(i).parse()?,
            chunk_count: usize::try_from(counts.value(i))?,
            chunks: payload.chunks,
            vectors: payload.vectors,
        });
    }
    Ok(out)
}
