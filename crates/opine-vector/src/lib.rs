//! Vector store adapter: semantic retrieval of feedback by topic and
//! sentiment filter.
//!
//! The core never interprets the vectors; relevance ranking is the
//! adapter's choice (cosine similarity over embeddings for both backends
//! shipped here). Points carry the topic and sentiment of their feedback so
//! filtered queries run inside the store.

mod http_backend;
mod memory;

use async_trait::async_trait;
use opine_error::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use http_backend::HttpVectorIndex;
pub use memory::MemoryVectorIndex;

/// One stored point: a feedback embedding plus filterable payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    /// Feedback identifier.
    pub feedback_id: Uuid,
    /// Embedding vector.
    pub vector: Vec<f64>,
    /// Assigned topic, once clustered.
    pub topic_id: Option<i64>,
    /// Sentiment class, once annotated.
    pub sentiment: Option<i16>,
}

/// A query hit, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    /// Feedback identifier.
    pub feedback_id: Uuid,
    /// Backend-defined relevance score.
    pub score: f64,
}

/// Filter bundle for queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorFilter {
    /// Restrict to one topic.
    pub topic_id: Option<i64>,
    /// Restrict to one sentiment class.
    pub sentiment: Option<i16>,
}

/// Vector index operations.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the point for a feedback id.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` when the backend is unreachable.
    async fn upsert(&self, point: VectorPoint) -> Result<()>;

    /// Return up to `k` feedback identifiers ordered by relevance.
    ///
    /// With a query vector, ranking is similarity against it; without one,
    /// the backend returns filtered points in its own scan order.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` when the backend is unreachable.
    async fn query(
        &self,
        query_vector: Option<&[f64]>,
        filter: VectorFilter,
        k: usize,
    ) -> Result<Vec<ScoredPoint>>;
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude inputs.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_opposite_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
