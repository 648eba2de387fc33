//! Enrichment workers: the four-stage pipeline behind the named queues.
//!
//! Stages cascade by sequential enqueue on success (`ingest` then
//! `annotate` then `cluster` then `reports`), which is what guarantees the
//! per-feedback ordering. Every stage is idempotent on replay: annotation
//! writes are keyed upserts, topic assignment rewrites the same row, and
//! the reports stage's invalidation and refresh are naturally repeatable.

pub mod keywords;
pub mod metrics;
pub mod model;
pub mod stages;
pub mod worker;

pub use model::{EnrichmentModel, HttpModel, LexiconModel, SentimentScore};
pub use stages::StageContext;
pub use worker::{JobProcessor, WorkerPool};
