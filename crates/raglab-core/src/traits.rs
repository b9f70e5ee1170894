use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Experiment, VectorCollection};

/// Opaque text-to-vector function. Implementations return one L2-normalized
/// vector of length `dim()` per input, in input order.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Persisted collections. Each call is atomic: it applies fully or fails.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Insert or replace by `collection.id`.
    async fn put(&self, collection: &VectorCollection) -> Result<()>;
    async fn get_all(&self) -> Result<Vec<VectorCollection>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Append-only record of ingestion runs.
#[async_trait]
pub trait ExperimentLog: Send + Sync {
    async fn append(&self, experiment: &Experiment) -> Result<()>;
    /// Oldest first.
    async fn list(&self) -> Result<Vec<Experiment>>;
}
