//! HTTP vector store backend (Qdrant-style REST API).
//!
//! Speaks the points/search/scroll subset of the Qdrant HTTP API. The
//! collection is created on startup when missing; vectors are stored with
//! `topic_id` and `sentiment` payload fields for filtered retrieval.

use async_trait::async_trait;
use opine_error::{OpineError, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::{ScoredPoint, VectorFilter, VectorIndex, VectorPoint};

/// Collection name used for feedback embeddings.
const COLLECTION: &str = "opine_feedback";

/// HTTP vector index client.
#[derive(Clone)]
pub struct HttpVectorIndex {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: Uuid,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<SearchHit>,
}

impl HttpVectorIndex {
    /// Create a client against the given base URL and ensure the collection
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` when the store is unreachable.
    pub async fn connect(base_url: &str, vector_size: usize) -> Result<Self> {
        let index = Self {
            client:   reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        };
        index.ensure_collection(vector_size).await?;
        Ok(index)
    }

    async fn ensure_collection(&self, vector_size: usize) -> Result<()> {
        let url = format!("{}/collections/{COLLECTION}", self.base_url);

        let existing = self.client.get(&url).send().await.map_err(vector_err)?;
        if existing.status().is_success() {
            debug!(collection = COLLECTION, "vector collection present");
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": vector_size, "distance": "Cosine" }
        });
        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(vector_err)?;
        // 409 covers a concurrent create racing this one.
        if response.status().is_success() || response.status().as_u16() == 409 {
            debug!(collection = COLLECTION, "vector collection created");
            Ok(())
        } else {
            Err(OpineError::unavailable(
                "vector-store",
                format!("collection setup failed with {}", response.status()),
            ))
        }
    }

    fn filter_json(filter: VectorFilter) -> Option<serde_json::Value> {
        let mut must = Vec::new();
        if let Some(topic_id) = filter.topic_id {
            must.push(json!({"key": "topic_id", "match": {"value": topic_id}}));
        }
        if let Some(sentiment) = filter.sentiment {
            must.push(json!({"key": "sentiment", "match": {"value": sentiment}}));
        }
        if must.is_empty() {
            None
        } else {
            Some(json!({"must": must}))
        }
    }
}

fn vector_err(e: reqwest::Error) -> OpineError {
    OpineError::unavailable("vector-store", e.to_string())
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        let url = format!("{}/collections/{COLLECTION}/points", self.base_url);
        let body = json!({
            "points": [{
                "id": point.feedback_id,
                "vector": point.vector,
                "payload": {
                    "topic_id": point.topic_id,
                    "sentiment": point.sentiment,
                }
            }]
        });
        let response = self
            .client
            .put(&url)
            .query(&[("wait", "true")])
            .json(&body)
            .send()
            .await
            .map_err(vector_err)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(OpineError::unavailable(
                "vector-store",
                format!("upsert failed with {}", response.status()),
            ))
        }
    }

    async fn query(
        &self,
        query_vector: Option<&[f64]>,
        filter: VectorFilter,
        k: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let filter_json = Self::filter_json(filter);

        if let Some(vector) = query_vector {
            let url = format!("{}/collections/{COLLECTION}/points/search", self.base_url);
            let mut body = json!({"vector": vector, "limit": k});
            if let Some(f) = filter_json {
                body["filter"] = f;
            }
            let response: SearchResponse = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(vector_err)?
                .error_for_status()
                .map_err(vector_err)?
                .json()
                .await
                .map_err(vector_err)?;
            Ok(response
                .result
                .into_iter()
                .map(|hit| ScoredPoint {
                    feedback_id: hit.id,
                    score:       hit.score,
                })
                .collect())
        } else {
            let url = format!("{}/collections/{COLLECTION}/points/scroll", self.base_url);
            let mut body = json!({"limit": k, "with_payload": false, "with_vector": false});
            if let Some(f) = filter_json {
                body["filter"] = f;
            }
            let response: ScrollResponse = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(vector_err)?
                .error_for_status()
                .map_err(vector_err)?
                .json()
                .await
                .map_err(vector_err)?;
            Ok(response
                .result
                .points
                .into_iter()
                .map(|hit| ScoredPoint {
                    feedback_id: hit.id,
                    score:       1.0,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_json_shapes() {
        assert!(HttpVectorIndex::filter_json(VectorFilter::default()).is_none());

        let full = HttpVectorIndex::filter_json(VectorFilter {
            topic_id:  Some(7),
            sentiment: Some(-1),
        })
        .expect("filter");
        let must = full["must"].as_array().expect("must array");
        assert_eq!(must.len(), 2);
    }
}
