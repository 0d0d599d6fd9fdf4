//! Cosine similarity.
//!
//! Both search paths report the same quantity: cosine similarity in
//! `[-1, 1]`. The engine-side path maps its cosine distance as
//! `1 - distance`; this module is the client-side computation used by the
//! fallback search.

/// Cosine similarity between two vectors: `dot(a, b) / (|a| * |b|)`.
///
/// A zero-norm operand yields 0.0 rather than dividing by zero. Mismatched
/// lengths also yield 0.0, since such a pair can never be a meaningful
/// match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
