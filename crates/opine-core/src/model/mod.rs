//! Entity model shared across the workspace.

mod annotation;
mod audit;
mod batch;
mod feedback;
mod topic;

pub use annotation::{Annotation, Sentiment};
pub use audit::{AuditAction, AuditEntry};
pub use batch::{Batch, BatchCounters, RowOutcome};
pub use feedback::{Feedback, NewFeedback};
pub use topic::{Topic, UNASSIGNED_TOPIC_ID};
