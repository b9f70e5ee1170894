use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use raglab_core::config::EmbeddingSettings;
use raglab_core::error::{Error, Result};
use raglab_core::traits::Embedder;

type Factory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Embedder>> + Send + Sync>;

/// Lazily constructed, shared embedder.
///
/// The factory runs at most once, on a blocking worker, the first time a
/// vector is requested; concurrent first callers wait on the same
/// initialization. Every embedding call also runs on a blocking worker so
/// the async caller only suspends.
pub struct EmbeddingHandle {
    cell: OnceCell<Arc<dyn Embedder>>,
    factory: Factory,
}

impl EmbeddingHandle {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Embedder>> + Send + Sync + 'static,
    {
        Self { cell: OnceCell::new(), factory: Arc::new(factory) }
    }

    /// Wrap an embedder that is already built.
    pub fn ready(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(embedder)),
            factory: Arc::new(|| Err(anyhow::anyhow!("embedder is pre-initialized"))),
        }
    }

    pub fn from_settings(settings: EmbeddingSettings) -> Self {
        Self::new(move || crate::get_default_embedder(&settings).map(Arc::from))
    }

    pub fn is_initialized(&self) -> bool { self.cell.initialized() }

    pub async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.cell
            .get_or_try_init(|| async {
                debug!("initializing embedder");
                let factory = Arc::clone(&self.factory);
                tokio::task::spawn_blocking(move || factory())
                    .await
                    .map_err(|e| Error::embedding("embedding model initialization was interrupted", e))?
                    .map_err(|e| Error::embedding("could not load the embedding model", format!("{e:#}")))
            })
            .await
            .cloned()
    }

    /// Embed a batch. Empty or whitespace-only entries are embedded as a
    /// single space instead of being rejected.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let sanitized = sanitize_batch(texts);
        let embedder = self.embedder().await?;
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&sanitized))
            .await
            .map_err(|e| Error::embedding("embedding task was interrupted", e))?
            .map_err(|e| Error::embedding("failed to generate embeddings", format!("{e:#}")))?;
        if vectors.len() != texts.len() {
            return Err(Error::embedding(
                "embedding provider returned the wrong number of vectors",
                format!("expected {}, got {}", texts.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }

    /// Embed a search query. Blank queries are invalid input.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::invalid_input("query text is empty"));
        }
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::embedding("failed to generate the query embedding", "provider returned no vector"))
    }
}

pub fn sanitize_batch(texts: &[String]) -> Vec<String> {
    texts
        .iter()
        .map(|t| if t.trim().is_empty() { " ".to_string() } else { t.clone() })
        .collect()
}
