use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use raglab_core::chunking::ChunkingEngine;
use raglab_core::error::{Error, Result};
use raglab_core::traits::{CollectionStore, ExperimentLog};
use raglab_core::types::{ChunkStats, ChunkingMethod, Experiment, SourceDocument, VectorCollection};
use raglab_embed::EmbeddingHandle;

/// What one ingestion run produced for a single (file, method) pair.
#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub id: String,
    pub name: String,
    pub stats: ChunkStats,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub collections: Vec<CollectionSummary>,
    pub experiment: Experiment,
}

/// Chunk → embed → store, one collection per document and method.
pub struct IngestPipeline<'a> {
    engine: ChunkingEngine,
    embedder: &'a EmbeddingHandle,
    progress: bool,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(engine: ChunkingEngine, embedder: &'a EmbeddingHandle) -> Self { Self { engine, embedder, progress: false } }

    /// Draw a progress bar on stderr while embedding.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(
        &self,
        docs: &[SourceDocument],
        methods: &[ChunkingMethod],
        store: &dyn CollectionStore,
        log: &dyn ExperimentLog,
    ) -> Result<IngestReport> {
        if docs.is_empty() {
            return Err(Error::invalid_input("no documents to ingest"));
        }
        let methods: Vec<ChunkingMethod> = methods.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if methods.is_empty() {
            return Err(Error::invalid_input("select at least one chunking method"));
        }

        let started = Instant::now();
        let run_at = Utc::now();
        let stamp = run_at.to_rfc3339();
        let pb = self.progress_bar((docs.len() * methods.len()) as u64);
        let mut built = Vec::new();
        let mut collections = Vec::new();

        // Nothing is written until every pair is chunked and embedded.
        for (position, doc) in docs.iter().enumerate() {
            for &method in &methods {
                pb.set_message(format!("{} · {}", doc.file_name, method.label()));
                let id = derive_id(&[&position.to_string(), &doc.file_name, method.as_str(), &stamp]);
                let (chunks, stats) = self.engine.chunk_document(doc, method, &id);
                pb.inc(1);
                if chunks.is_empty() {
                    debug!(file = %doc.file_name, %method, "no chunks, skipping");
                    continue;
                }
                let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
                let vectors = self.embedder.embed(&texts).await?;
                let name = format!("{} · {}", doc.file_name, method.label());
                built.push(VectorCollection::new(id.clone(), name.clone(), Utc::now(), doc.file_name.clone(), method, chunks, vectors)?);
                collections.push(CollectionSummary { id, name, stats });
            }
        }
        pb.finish_and_clear();

        let mut written: Vec<&str> = Vec::with_capacity(built.len());
        for collection in &built {
            if let Err(e) = store.put(collection).await {
                rollback(store, &written).await;
                return Err(e);
            }
            written.push(&collection.id);
        }

        let mut chunk_counts: BTreeMap<ChunkingMethod, usize> = BTreeMap::new();
        for collection in &built {
            *chunk_counts.entry(collection.chunk_method).or_default() += collection.chunk_count;
        }

        let files_processed: BTreeSet<String> = docs.iter().map(|d| d.file_name.clone()).collect();
        let experiment = Experiment {
            id: derive_id(&["experiment", &stamp, &files_processed.iter().cloned().collect::<Vec<_>>().join("\n")]),
            timestamp: run_at,
            files_processed,
            chunk_methods: methods.iter().copied().collect(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            chunk_counts,
        };
        if let Err(e) = log.append(&experiment).await {
            rollback(store, &written).await;
            return Err(e);
        }
        info!(
            collections = collections.len(),
            files = experiment.files_processed.len(),
            ms = experiment.processing_time_ms,
            "ingestion finished"
        );
        Ok(IngestReport { collections, experiment })
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} collections {msg}") {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Remove the collections of a failed run. Best effort: the original error
/// is what the caller sees.
async fn rollback(store: &dyn CollectionStore, ids: &[&str]) {
    for id in ids {
        if let Err(e) = store.delete(id).await {
            warn!(collection = %id, error = %e, "could not roll back collection");
        }
    }
    if !ids.is_empty() {
        warn!(collections = ids.len(), "ingestion failed, rolled back written collections");
    }
}

/// Short stable id: the first 16 hex chars of the blake3 hash of `parts`.
pub fn derive_id(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex()[..16].to_string()
}
