//! Streaming CSV exports.
//!
//! The encoder is a pure function from a stream of string records to a
//! stream of `Bytes` chunks: the header flushes first (clients see output
//! immediately regardless of result-set size), then one chunk per fetched
//! row batch. The full result set is never materialised; backpressure
//! propagates from the HTTP socket through the encoder to the database
//! cursor.

mod encode;
mod variants;

pub use encode::{csv_byte_stream, records_to_csv_bytes};
pub use variants::{
    analytics_csv, feedback_csv, topics_csv, ANALYTICS_HEADER, FEEDBACK_HEADER, TOPICS_HEADER,
};

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;
    use opine_error::Result;

    async fn collect(stream: impl futures::Stream<Item = Result<Bytes>>) -> String {
        let chunks: Vec<Result<Bytes>> = stream.collect().await;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&chunk.expect("chunk"));
        }
        String::from_utf8(out).expect("utf8")
    }

    #[tokio::test]
    async fn test_header_precedes_rows() {
        let rows = futures::stream::iter(vec![Ok(vec![
            vec!["1".to_string(), "alpha".to_string()],
            vec!["2".to_string(), "beta".to_string()],
        ])]);
        let body = collect(csv_byte_stream(&["id", "label"], rows)).await;

        let mut lines = body.lines();
        assert_eq!(lines.next(), Some("id,label"));
        assert_eq!(lines.next(), Some("1,alpha"));
        assert_eq!(lines.next(), Some("2,beta"));
    }

    #[tokio::test]
    async fn test_empty_result_still_has_header() {
        let rows = futures::stream::iter(Vec::<Result<Vec<Vec<String>>>>::new());
        let body = collect(csv_byte_stream(&["id", "label"], rows)).await;
        assert_eq!(body, "id,label\n");
    }

    #[tokio::test]
    async fn test_rfc4180_quoting() {
        let rows = futures::stream::iter(vec![Ok(vec![vec![
            "1".to_string(),
            "said \"slow\", very slow\nreally".to_string(),
        ]])]);
        let body = collect(csv_byte_stream(&["id", "text"], rows)).await;
        assert!(body.contains("\"said \"\"slow\"\", very slow\nreally\""));
    }

    #[tokio::test]
    async fn test_error_terminates_stream() {
        let rows = futures::stream::iter(vec![
            Ok(vec![vec!["1".to_string()]]),
            Err(opine_error::OpineError::database("connection lost")),
        ]);
        let chunks: Vec<Result<Bytes>> = csv_byte_stream(&["id"], rows).collect().await;

        assert!(chunks[0].is_ok()); // header
        assert!(chunks[1].is_ok()); // first row chunk
        assert!(chunks[2].is_err());
        assert_eq!(chunks.len(), 3);
    }
}
