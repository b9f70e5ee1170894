use std::collections::HashMap;
use tracing::debug;

use crate::tokenize::tokenize;

/// Okapi BM25 tuning constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 1.5, b: 0.75 } }
}

impl Bm25Params {
    /// Raw, unbounded BM25 score of `query` against each document, in input
    /// order. Corpus statistics (N, df, average length) come from this batch
    /// only. Repeated query terms count once per occurrence.
    pub fn score<S: AsRef<str>>(&self, query: &str, documents: &[S]) -> Vec<f32> {
        if documents.is_empty() {
            return Vec::new();
        }
        let query_terms = tokenize(query);
        let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();
        let n = docs.len() as f64;
        let avg_len = docs.iter().map(Vec::len).sum::<usize>() as f64 / n;
        debug!(terms = query_terms.len(), docs = docs.len(), avg_len, "bm25 batch");

        let term_freqs: Vec<HashMap<&str, usize>> = docs
            .iter()
            .map(|tokens| {
                let mut tf = HashMap::new();
                for t in tokens {
                    *tf.entry(t.as_str()).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        let mut idf: HashMap<&str, f64> = HashMap::new();
        for term in &query_terms {
            idf.entry(term.as_str()).or_insert_with(|| {
                let df = term_freqs.iter().filter(|tf| tf.contains_key(term.as_str())).count() as f64;
                ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
            });
        }

        docs.iter()
            .zip(&term_freqs)
            .map(|(tokens, tf)| {
                if tokens.is_empty() {
                    return 0.0;
                }
                let length_norm = self.k1 * (1.0 - self.b + self.b * (tokens.len() as f64 / avg_len));
                let total: f64 = query_terms
                    .iter()
                    .map(|term| {
                        let f = tf.get(term.as_str()).copied().unwrap_or(0) as f64;
                        idf[term.as_str()] * f * (self.k1 + 1.0) / (f + length_norm)
                    })
                    .sum();
                total as f32
            })
            .collect()
    }
}

/// BM25 with the default `k1 = 1.5`, `b = 0.75`.
pub fn bm25_scores<S: AsRef<str>>(query: &str, documents: &[S]) -> Vec<f32> { Bm25Params::default().score(query, documents) }

/// Scale scores into [0, 1] by the batch maximum. The divisor is floored at
/// 1, so an all-zero batch stays zero and weak batches are not inflated.
pub fn normalize_by_max(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(1.0f32, f32::max);
    scores.iter().map(|s| s / max).collect()
}
