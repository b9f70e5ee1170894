//! Multi-collection retrieval and the ingestion pipeline.

pub mod ingest;
pub mod orchestrator;

pub use ingest::{derive_id, CollectionSummary, IngestPipeline, IngestReport};
pub use orchestrator::{
    rank, score_collection, RetrievalOrchestrator, SearchRequest, SearchResponse, DENSE_WEIGHT, SPARSE_WEIGHT,
};
