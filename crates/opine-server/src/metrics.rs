//! HTTP metrics and the Prometheus endpoint.

use std::sync::OnceLock;

use axum::http::Method;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec, TextEncoder,
};

fn requests_total() -> &'static IntCounterVec {
    static METRIC: OnceLock<IntCounterVec> = OnceLock::new();
    METRIC.get_or_init(|| {
        register_int_counter_vec!(
            "opine_http_requests_total",
            "HTTP requests by method, path, and status",
            &["method", "path", "status"]
        )
        .expect("metric registration")
    })
}

fn request_latency() -> &'static HistogramVec {
    static METRIC: OnceLock<HistogramVec> = OnceLock::new();
    METRIC.get_or_init(|| {
        register_histogram_vec!(
            "opine_http_request_duration_ms",
            "HTTP request latency in milliseconds",
            &["method", "path"],
            vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 30000.0]
        )
        .expect("metric registration")
    })
}

/// Record one handled request.
pub fn observe_request(method: &Method, path: &str, status: u16, latency_ms: f64) {
    let path = normalize_path(path);
    requests_total()
        .with_label_values(&[method.as_str(), &path, &status.to_string()])
        .inc();
    request_latency()
        .with_label_values(&[method.as_str(), &path])
        .observe(latency_ms);
}

/// Collapse id segments so path labels stay low-cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_id = segment.parse::<i64>().is_ok() || uuid::Uuid::parse_str(segment).is_ok();
            if is_id {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Render the default registry in Prometheus text format.
#[must_use]
pub fn render() -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_collapses_ids() {
        assert_eq!(normalize_path("/admin/topics/42/feedback"), "/admin/topics/:id/feedback");
        assert_eq!(
            normalize_path("/api/feedback/3fa9c1d2-0000-0000-0000-000000000000"),
            "/api/feedback/:id"
        );
        assert_eq!(normalize_path("/analytics/summary"), "/analytics/summary");
    }

    #[test]
    fn test_render_includes_counters() {
        observe_request(&Method::GET, "/health", 200, 1.2);
        let text = render();
        assert!(text.contains("opine_http_requests_total"));
    }
}
