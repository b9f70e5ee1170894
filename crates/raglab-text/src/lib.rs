//! raglab-text
//!
//! Lexical relevance scoring: a word tokenizer and BM25 computed over an
//! ad-hoc batch of documents (one collection's chunks at query time).

pub mod bm25;
pub mod tokenize;

pub use bm25::{bm25_scores, normalize_by_max, Bm25Params};
pub use tokenize::tokenize;
