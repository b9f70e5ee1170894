//! Domain types shared by the chunker, the scorers and the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type ChunkId = String;
pub type CollectionId = String;

/// Strategy used to split a document into chunks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMethod {
    Fixed,
    Recursive,
    Token,
    Sentence,
    Semantic,
}

impl ChunkingMethod {
    pub const ALL: [ChunkingMethod; 5] = [Self::Fixed, Self::Recursive, Self::Token, Self::Sentence, Self::Semantic];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Recursive => "recursive",
            Self::Token => "token",
            Self::Sentence => "sentence",
            Self::Semantic => "semantic",
        }
    }

    /// Human readable label used in collection names and listings.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed Size",
            Self::Recursive => "Recursive Character",
            Self::Token => "Token Based",
            Self::Sentence => "Sentence Based",
            Self::Semantic => "Semantic (paragraphs)",
        }
    }
}

impl fmt::Display for ChunkingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ChunkingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid_input(format!("unknown chunking method '{s}'")))
    }
}

/// Chunking options. Each method reads only the subset relevant to it;
/// absent options fall back to that method's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkParams {
    /// Max span length in characters (fixed, recursive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    /// Characters (fixed, recursive), tokens (token) or sentences (sentence)
    /// re-shared between consecutive chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap: Option<usize>,
    /// Approximate token budget per chunk (token).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
    /// Sentences per chunk (sentence).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentence_count: Option<usize>,
}

/// Summary statistics of a chunking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkStats {
    pub count: usize,
    pub avg_size: f64,
    pub avg_tokens: f64,
}

/// A contiguous span of a source document; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub index: usize,
    pub text: String,
    pub source_file_name: String,
    pub chunk_method: ChunkingMethod,
}

/// Chunks of one source document plus their embeddings.
///
/// `vectors[i]` belongs to `chunks[i]`. Read-only once built; removed from a
/// store only as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorCollection {
    pub id: CollectionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub source_file_name: String,
    pub chunk_method: ChunkingMethod,
    pub chunk_count: usize,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

impl VectorCollection {
    pub fn new(
        id: CollectionId,
        name: String,
        created_at: DateTime<Utc>,
        source_file_name: String,
        chunk_method: ChunkingMethod,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        let collection = Self {
            id,
            name,
            created_at,
            source_file_name,
            chunk_method,
            chunk_count: chunks.len(),
            chunks,
            vectors,
        };
        collection.validate()?;
        Ok(collection)
    }

    /// Check the structural invariants: one vector per chunk, a single
    /// dimensionality, and chunk indices `0..n` in order.
    pub fn validate(&self) -> Result<()> {
        if self.chunks.len() != self.chunk_count || self.vectors.len() != self.chunk_count {
            return Err(Error::invalid_input(format!(
                "collection '{}' has {} chunks and {} vectors but declares {}",
                self.id,
                self.chunks.len(),
                self.vectors.len(),
                self.chunk_count
            )));
        }
        if let Some(first) = self.vectors.first() {
            if let Some(bad) = self.vectors.iter().find(|v| v.len() != first.len()) {
                return Err(Error::invalid_input(format!(
                    "collection '{}' mixes vector dimensions {} and {}",
                    self.id,
                    first.len(),
                    bad.len()
                )));
            }
        }
        if let Some((pos, chunk)) = self.chunks.iter().enumerate().find(|(i, c)| c.index != *i) {
            return Err(Error::invalid_input(format!(
                "collection '{}' chunk at position {} has index {}",
                self.id, pos, chunk.index
            )));
        }
        Ok(())
    }

    /// Dimensionality of the stored vectors, `None` for an empty collection.
    pub fn dim(&self) -> Option<usize> { self.vectors.first().map(Vec::len) }

    /// Rough on-disk footprint in bytes: text at 1.5 bytes per char plus
    /// eight bytes per vector component.
    pub fn estimated_size_bytes(&self) -> f64 {
        let text: usize = self.chunks.iter().map(|c| c.text.chars().count()).sum();
        let floats: usize = self.vectors.iter().map(Vec::len).sum();
        text as f64 * 1.5 + floats as f64 * 8.0
    }
}

/// Retrieval method; every scoring branch matches on it exhaustively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Dense,
    Sparse,
    Hybrid,
}

impl RetrievalMethod {
    /// Evaluation order used when several methods are enabled.
    pub const ALL: [RetrievalMethod; 3] = [Self::Dense, Self::Sparse, Self::Hybrid];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether scoring with this method needs the query embedding.
    pub fn needs_embedding(self) -> bool {
        match self {
            Self::Dense | Self::Hybrid => true,
            Self::Sparse => false,
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RetrievalMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid_input(format!("unknown retrieval method '{s}'")))
    }
}

/// One scored chunk. Produced fresh per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
    pub retrieval_method: RetrievalMethod,
    pub collection_name: String,
    pub collection_id: CollectionId,
}

/// Log entry for one ingestion run. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub files_processed: BTreeSet<String>,
    pub chunk_methods: BTreeSet<ChunkingMethod>,
    pub processing_time_ms: u64,
    pub chunk_counts: BTreeMap<ChunkingMethod, usize>,
}

/// Raw text extracted from one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub file_name: String,
    pub text: String,
}
