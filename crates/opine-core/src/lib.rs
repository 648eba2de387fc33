//! Core domain types for the Opine feedback analytics backend.
//!
//! This crate holds everything the other crates agree on: the entity model
//! (feedback, annotations, topics, audit entries, batches), the application
//! configuration, text normalisation and language detection, and the
//! analytics parameter/row types with their cache key derivation.
//!
//! It deliberately has no I/O: adapters (`opine-db`, `opine-cache`,
//! `opine-queue`, `opine-vector`) and engines build on these types.

pub mod analytics;
pub mod config;
pub mod model;
pub mod text;

pub use config::AppConfig;
pub use model::{
    Annotation, AuditAction, AuditEntry, Batch, BatchCounters, Feedback, NewFeedback, RowOutcome,
    Sentiment, Topic, UNASSIGNED_TOPIC_ID,
};
