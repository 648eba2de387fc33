//! In-process vector index.
//!
//! Brute-force cosine ranking; adequate for tests and deployments without
//! a vector store URL.

use async_trait::async_trait;
use opine_error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{cosine_similarity, ScoredPoint, VectorFilter, VectorIndex, VectorPoint};

/// In-memory vector index.
#[derive(Default)]
pub struct MemoryVectorIndex {
    points: RwLock<HashMap<Uuid, VectorPoint>>,
}

impl MemoryVectorIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}

fn matches(point: &VectorPoint, filter: VectorFilter) -> bool {
    if let Some(topic_id) = filter.topic_id {
        if point.topic_id != Some(topic_id) {
            return false;
        }
    }
    if let Some(sentiment) = filter.sentiment {
        if point.sentiment != Some(sentiment) {
            return false;
        }
    }
    true
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        self.points.write().insert(point.feedback_id, point);
        Ok(())
    }

    async fn query(
        &self,
        query_vector: Option<&[f64]>,
        filter: VectorFilter,
        k: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let points = self.points.read();
        let mut hits: Vec<ScoredPoint> = points
            .values()
            .filter(|p| matches(p, filter))
            .map(|p| ScoredPoint {
                feedback_id: p.feedback_id,
                score:       query_vector.map_or(1.0, |q| cosine_similarity(q, &p.vector)),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(vector: Vec<f64>, topic_id: Option<i64>, sentiment: Option<i16>) -> VectorPoint {
        VectorPoint {
            feedback_id: Uuid::new_v4(),
            vector,
            topic_id,
            sentiment,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let index = MemoryVectorIndex::new();
        let mut p = point(vec![1.0, 0.0], None, None);
        let id = p.feedback_id;
        index.upsert(p.clone()).await.expect("upsert");

        p.topic_id = Some(3);
        index.upsert(p).await.expect("upsert");

        assert_eq!(index.len(), 1);
        let hits = index
            .query(None, VectorFilter { topic_id: Some(3), sentiment: None }, 10)
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].feedback_id, id);
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let index = MemoryVectorIndex::new();
        let close = point(vec![1.0, 0.1], None, None);
        let far = point(vec![0.0, 1.0], None, None);
        let close_id = close.feedback_id;
        index.upsert(close).await.expect("upsert");
        index.upsert(far).await.expect("upsert");

        let hits = index
            .query(Some(&[1.0, 0.0]), VectorFilter::default(), 2)
            .await
            .expect("query");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].feedback_id, close_id);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_query_applies_filters_and_k() {
        let index = MemoryVectorIndex::new();
        for _ in 0..5 {
            index
                .upsert(point(vec![1.0, 0.0], Some(1), Some(-1)))
                .await
                .expect("upsert");
        }
        index
            .upsert(point(vec![1.0, 0.0], Some(2), Some(1)))
            .await
            .expect("upsert");

        let hits = index
            .query(
                None,
                VectorFilter {
                    topic_id:  Some(1),
                    sentiment: Some(-1),
                },
                3,
            )
            .await
            .expect("query");
        assert_eq!(hits.len(), 3);
    }
}
