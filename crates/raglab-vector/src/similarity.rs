use raglab_core::error::{Error, Result};

/// `dot(a, b) / (|a| * |b|)`, in [-1, 1].
///
/// Fails fast on a dimension mismatch. A zero vector has no direction, so
/// its similarity to anything is 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::invalid_input(format!("vector dimensions differ: {} vs {}", a.len(), b.len())));
    }
    let (mut dot, mut norm_a, mut norm_b) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

/// Similarity of `query` against every vector, in order.
pub fn cosine_all(query: &[f32], vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    vectors.iter().map(|v| cosine_similarity(query, v)).collect()
}
