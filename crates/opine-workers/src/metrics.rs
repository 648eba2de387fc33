//! Prometheus counters for the enrichment pipeline.

use std::sync::OnceLock;

use prometheus::{register_int_counter_vec, IntCounterVec};

fn jobs_processed() -> &'static IntCounterVec {
    static METRIC: OnceLock<IntCounterVec> = OnceLock::new();
    METRIC.get_or_init(|| {
        register_int_counter_vec!(
            "opine_jobs_processed_total",
            "Jobs processed per queue and outcome",
            &["queue", "outcome"]
        )
        .expect("metric registration")
    })
}

fn rows_skipped() -> &'static IntCounterVec {
    static METRIC: OnceLock<IntCounterVec> = OnceLock::new();
    METRIC.get_or_init(|| {
        register_int_counter_vec!(
            "opine_enrichment_rows_skipped_total",
            "Rows skipped with a logical error, per stage",
            &["stage"]
        )
        .expect("metric registration")
    })
}

/// Count a completed job.
pub fn job_completed(queue: &str) {
    jobs_processed().with_label_values(&[queue, "completed"]).inc();
}

/// Count a failed attempt (will retry or dead-letter).
pub fn job_failed(queue: &str) {
    jobs_processed().with_label_values(&[queue, "failed"]).inc();
}

/// Count a dead-lettered job.
pub fn job_dead_lettered(queue: &str) {
    jobs_processed().with_label_values(&[queue, "dead_lettered"]).inc();
}

/// Count a row skipped with a logical error.
pub fn row_skipped(stage: &str) {
    rows_skipped().with_label_values(&[stage]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_register_once() {
        job_completed("annotate");
        job_completed("annotate");
        job_failed("cluster");
        job_dead_lettered("reports");
        row_skipped("annotate");
        // Re-entry must not panic on duplicate registration.
        job_completed("annotate");
    }
}
