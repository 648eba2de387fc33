//! Annotation entity: the enrichment record attached to a feedback.

use chrono::{DateTime, Utc};
use opine_error::{OpineError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentiment class of a feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    /// Negative sentiment (-1).
    Negative,
    /// Neutral sentiment (0).
    Neutral,
    /// Positive sentiment (+1).
    Positive,
}

impl Sentiment {
    /// Integer encoding used in the database and the public API.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Negative => -1,
            Self::Neutral => 0,
            Self::Positive => 1,
        }
    }

    /// Decode from the integer encoding.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` for values outside {-1, 0, 1}.
    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            -1 => Ok(Self::Negative),
            0 => Ok(Self::Neutral),
            1 => Ok(Self::Positive),
            other => Err(OpineError::validation(format!(
                "sentiment must be -1, 0, or 1, got {other}"
            ))),
        }
    }
}

/// A live annotation row. At most one exists per feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation identifier.
    pub id: Uuid,

    /// Owning feedback.
    pub feedback_id: Uuid,

    /// Sentiment class, if classified.
    pub sentiment: Option<Sentiment>,

    /// Classifier confidence in [0, 1]; present iff `sentiment` is.
    pub sentiment_confidence: Option<f64>,

    /// Assigned topic, if clustered.
    pub topic_id: Option<i64>,

    /// Toxicity score in [0, 1]; rows annotated before a toxicity model
    /// existed carry NULL here.
    pub toxicity: Option<f64>,

    /// Embedding vector, if computed.
    pub embedding: Option<Vec<f64>>,

    /// Version tag of the model that produced the scores.
    pub model_version: Option<String>,

    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    /// Check the confidence/sentiment pairing invariant.
    #[must_use]
    pub const fn confidence_consistent(&self) -> bool {
        self.sentiment.is_some() == self.sentiment_confidence.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_roundtrip() {
        for s in [Sentiment::Negative, Sentiment::Neutral, Sentiment::Positive] {
            assert_eq!(Sentiment::from_i16(s.as_i16()).expect("roundtrip"), s);
        }
    }

    #[test]
    fn test_sentiment_out_of_range() {
        assert!(Sentiment::from_i16(2).is_err());
        assert!(Sentiment::from_i16(-3).is_err());
    }

    #[test]
    fn test_confidence_invariant() {
        let mut ann = Annotation {
            id: Uuid::new_v4(),
            feedback_id: Uuid::new_v4(),
            sentiment: Some(Sentiment::Positive),
            sentiment_confidence: Some(0.92),
            topic_id: None,
            toxicity: None,
            embedding: None,
            model_version: Some("lexicon-v1".to_string()),
            updated_at: Utc::now(),
        };
        assert!(ann.confidence_consistent());

        ann.sentiment_confidence = None;
        assert!(!ann.confidence_consistent());
    }
}
