use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Instant;

use tracing::{debug, info, warn};

use raglab_core::config::RetrievalConfig;
use raglab_core::error::{Error, Result};
use raglab_core::traits::CollectionStore;
use raglab_core::types::{RetrievalMethod, SearchResult, VectorCollection};
use raglab_embed::EmbeddingHandle;
use raglab_text::{bm25_scores, normalize_by_max};
use raglab_vector::cosine_all;

pub const DENSE_WEIGHT: f32 = 0.7;
pub const SPARSE_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Collections to search, in the order their results are pooled.
    pub collection_ids: Vec<String>,
    pub config: RetrievalConfig,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub request_id: u64,
    pub results: Vec<SearchResult>,
}

/// Scores the chunks of the selected collections with every enabled method
/// and returns one ranked, bounded list.
pub struct RetrievalOrchestrator {
    embedder: EmbeddingHandle,
    generation: AtomicU64,
}

impl RetrievalOrchestrator {
    pub fn new(embedder: EmbeddingHandle) -> Self { Self { embedder, generation: AtomicU64::new(0) } }

    pub fn embedder(&self) -> &EmbeddingHandle { &self.embedder }

    /// Whether `request_id` belongs to the most recently started search.
    /// Results of older searches are stale and should be dropped.
    pub fn is_current(&self, request_id: u64) -> bool { self.generation.load(AtomicOrdering::SeqCst) == request_id }

    pub async fn search(&self, store: &dyn CollectionStore, request: SearchRequest) -> Result<SearchResponse> {
        let request_id = self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        validate(&request)?;
        let started = Instant::now();
        let methods = request.config.enabled();

        let query_vec = if methods.iter().any(|m| m.needs_embedding()) {
            Some(self.embedder.embed_one(&request.query).await?)
        } else {
            None
        };

        let all = store.get_all().await?;
        let mut results = Vec::new();
        for id in &request.collection_ids {
            let Some(collection) = all.iter().find(|c| &c.id == id) else {
                warn!(collection = %id, "selected collection not found, skipping");
                continue;
            };
            results.extend(score_collection(collection, &request.query, query_vec.as_deref(), &methods)?);
        }

        rank(&mut results, request.config.result_budget());
        info!(
            request_id,
            methods = methods.len(),
            results = results.len(),
            ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(SearchResponse { request_id, results })
    }
}

fn validate(request: &SearchRequest) -> Result<()> {
    if request.query.trim().is_empty() {
        return Err(Error::invalid_input("query text is empty"));
    }
    if request.collection_ids.is_empty() {
        return Err(Error::invalid_input("select at least one collection"));
    }
    request.config.validate()
}

/// One result per chunk per method, methods in evaluation order.
pub fn score_collection(
    collection: &VectorCollection,
    query: &str,
    query_vec: Option<&[f32]>,
    methods: &[RetrievalMethod],
) -> Result<Vec<SearchResult>> {
    let needs_dense = methods.iter().any(|m| m.needs_embedding());
    let needs_sparse = methods.iter().any(|m| matches!(m, RetrievalMethod::Sparse | RetrievalMethod::Hybrid));

    let dense = match (needs_dense, query_vec) {
        (true, Some(q)) => cosine_all(q, &collection.vectors)?,
        (true, None) => return Err(Error::invalid_input("dense retrieval needs a query embedding")),
        (false, _) => Vec::new(),
    };
    let sparse = if needs_sparse {
        let texts: Vec<&str> = collection.chunks.iter().map(|c| c.text.as_str()).collect();
        normalize_by_max(&bm25_scores(query, &texts))
    } else {
        Vec::new()
    };
    debug!(collection = %collection.id, chunks = collection.chunk_count, "scored collection");

    let mut out = Vec::with_capacity(collection.chunks.len() * methods.len());
    for &method in methods {
        for (i, chunk) in collection.chunks.iter().enumerate() {
            let score = match method {
                RetrievalMethod::Dense => dense[i],
                RetrievalMethod::Sparse => sparse[i],
                RetrievalMethod::Hybrid => DENSE_WEIGHT * dense[i] + SPARSE_WEIGHT * sparse[i],
            };
            out.push(SearchResult {
                chunk: chunk.clone(),
                score,
                retrieval_method: method,
                collection_name: collection.name.clone(),
                collection_id: collection.id.clone(),
            });
        }
    }
    Ok(out)
}

/// Stable descending sort, then cut to `budget`. NaN scores sort last.
pub fn rank(results: &mut Vec<SearchResult>, budget: usize) {
    results.sort_by(|a, b| a.score.is_nan().cmp(&b.score.is_nan()).then_with(|| b.score.total_cmp(&a.score)));
    results.truncate(budget);
}
