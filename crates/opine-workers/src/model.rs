//! Enrichment model interface.
//!
//! The pipeline treats the model as a pure function with a declared
//! version tag: same input and version, same scores. Two implementations
//! ship: a lexicon classifier with a deterministic hashed embedding
//! (default, no external calls), and an HTTP client for an inference
//! endpoint, selected by the `hf_sentiment` flag.

use async_trait::async_trait;
use opine_core::Sentiment;
use opine_error::{OpineError, Result};
use serde::Deserialize;
use serde_json::json;

/// Embedding dimensionality for the lexicon model.
pub const LEXICON_EMBEDDING_DIM: usize = 64;

/// Sentiment classification output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentScore {
    /// Predicted class.
    pub sentiment: Sentiment,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

/// The enrichment model the annotate and cluster stages call.
#[async_trait]
pub trait EnrichmentModel: Send + Sync {
    /// Version tag recorded on every annotation this model produces.
    fn version(&self) -> &str;

    /// Classify sentiment.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` for transient endpoint failures.
    async fn sentiment(&self, text: &str) -> Result<SentimentScore>;

    /// Score toxicity, when the model supports it.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` for transient endpoint failures.
    async fn toxicity(&self, text: &str) -> Result<Option<f64>>;

    /// Compute an embedding vector.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` for transient endpoint failures.
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "love", "loved", "perfect", "fast", "helpful",
    "awesome", "fantastic", "easy", "wonderful", "best", "reliable", "smooth", "happy",
    "recommend", "quick", "intuitive",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "hated", "broken", "slow", "worst", "useless", "poor",
    "bug", "bugs", "crash", "crashes", "confusing", "disappointed", "disappointing", "expensive",
    "late", "unusable", "frustrating", "refund",
];

const TOXIC_WORDS: &[&str] = &[
    "idiot", "stupid", "moron", "garbage", "trash", "scam", "fraud", "liar", "pathetic",
    "incompetent",
];

/// Lexicon sentiment classifier with a hashed bag-of-words embedding.
#[derive(Debug, Default, Clone)]
pub struct LexiconModel;

impl LexiconModel {
    /// Create the lexicon model.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split_whitespace().map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
    }
}

#[async_trait]
impl EnrichmentModel for LexiconModel {
    fn version(&self) -> &str {
        "lexicon-v1"
    }

    async fn sentiment(&self, text: &str) -> Result<SentimentScore> {
        let mut positive = 0i32;
        let mut negative = 0i32;
        for token in Self::tokens(text) {
            if POSITIVE_WORDS.contains(&token.as_str()) {
                positive += 1;
            } else if NEGATIVE_WORDS.contains(&token.as_str()) {
                negative += 1;
            }
        }

        let hits = positive + negative;
        if hits == 0 {
            return Ok(SentimentScore {
                sentiment:  Sentiment::Neutral,
                confidence: 0.5,
            });
        }
        let balance = f64::from(positive - negative) / f64::from(hits);
        let sentiment = if balance > 0.2 {
            Sentiment::Positive
        } else if balance < -0.2 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };
        Ok(SentimentScore {
            sentiment,
            confidence: (0.5 + balance.abs() / 2.0).min(0.99),
        })
    }

    async fn toxicity(&self, text: &str) -> Result<Option<f64>> {
        let mut total = 0u32;
        let mut toxic = 0u32;
        for token in Self::tokens(text) {
            if token.is_empty() {
                continue;
            }
            total += 1;
            if TOXIC_WORDS.contains(&token.as_str()) {
                toxic += 1;
            }
        }
        if total == 0 {
            return Ok(Some(0.0));
        }
        // Saturates quickly: a couple of hits in a short text scores high.
        Ok(Some((f64::from(toxic) * 4.0 / f64::from(total)).min(1.0)))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let mut vector = vec![0.0f64; LEXICON_EMBEDDING_DIM];
        for token in Self::tokens(text) {
            if token.is_empty() {
                continue;
            }
            let bucket = (fnv1a(&token) as usize) % LEXICON_EMBEDDING_DIM;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// HTTP enrichment model client (HF-style inference endpoint).
#[derive(Clone)]
pub struct HttpModel {
    client: reqwest::Client,
    base_url: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct SentimentResponse {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct ToxicityResponse {
    score: f64,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
}

impl HttpModel {
    /// Create a client against the configured model endpoint.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client:   reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            version:  "hf-endpoint-v1".to_string(),
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, text: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        self.client
            .post(&url)
            .json(&json!({ "inputs": text }))
            .send()
            .await
            .map_err(model_err)?
            .error_for_status()
            .map_err(model_err)?
            .json()
            .await
            .map_err(model_err)
    }
}

fn model_err(e: reqwest::Error) -> OpineError {
    OpineError::unavailable("model-endpoint", e.to_string())
}

#[async_trait]
impl EnrichmentModel for HttpModel {
    fn version(&self) -> &str {
        &self.version
    }

    async fn sentiment(&self, text: &str) -> Result<SentimentScore> {
        let response: SentimentResponse = self.post("/sentiment", text).await?;
        let sentiment = match response.label.to_lowercase().as_str() {
            "positive" | "pos" => Sentiment::Positive,
            "negative" | "neg" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        };
        Ok(SentimentScore {
            sentiment,
            confidence: response.score.clamp(0.0, 1.0),
        })
    }

    async fn toxicity(&self, text: &str) -> Result<Option<f64>> {
        let response: ToxicityResponse = self.post("/toxicity", text).await?;
        Ok(Some(response.score.clamp(0.0, 1.0)))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let response: EmbeddingResponse = self.post("/embeddings", text).await?;
        Ok(response.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lexicon_positive() {
        let model = LexiconModel::new();
        let score = model
            .sentiment("Great product, fast delivery, I love it")
            .await
            .expect("score");
        assert_eq!(score.sentiment, Sentiment::Positive);
        assert!(score.confidence > 0.5);
    }

    #[tokio::test]
    async fn test_lexicon_negative() {
        let model = LexiconModel::new();
        let score = model
            .sentiment("Terrible app, crashes constantly, worst purchase")
            .await
            .expect("score");
        assert_eq!(score.sentiment, Sentiment::Negative);
    }

    #[tokio::test]
    async fn test_lexicon_neutral_without_signal() {
        let model = LexiconModel::new();
        let score = model.sentiment("The package arrived on a Tuesday").await.expect("score");
        assert_eq!(score.sentiment, Sentiment::Neutral);
        assert!((score.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_lexicon_toxicity() {
        let model = LexiconModel::new();
        let clean = model.toxicity("lovely support team").await.expect("score");
        assert_eq!(clean, Some(0.0));

        let toxic = model
            .toxicity("you are an idiot and this is garbage")
            .await
            .expect("score")
            .expect("some");
        assert!(toxic > 0.5);
    }

    #[tokio::test]
    async fn test_lexicon_embedding_deterministic_and_normalized() {
        let model = LexiconModel::new();
        let a = model.embed("slow checkout flow").await.expect("embed");
        let b = model.embed("slow checkout flow").await.expect("embed");
        assert_eq!(a, b);
        assert_eq!(a.len(), LEXICON_EMBEDDING_DIM);

        let norm: f64 = a.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_lexicon_embedding_similarity() {
        let model = LexiconModel::new();
        let a = model.embed("slow checkout flow").await.expect("embed");
        let b = model.embed("checkout flow is slow").await.expect("embed");
        let c = model.embed("battery drains overnight").await.expect("embed");

        let sim_ab = opine_vector::cosine_similarity(&a, &b);
        let sim_ac = opine_vector::cosine_similarity(&a, &c);
        assert!(sim_ab > sim_ac);
    }

    #[test]
    fn test_model_version_tags() {
        assert_eq!(LexiconModel::new().version(), "lexicon-v1");
        assert_eq!(HttpModel::new("http://model:8080/").version(), "hf-endpoint-v1");
    }
}
