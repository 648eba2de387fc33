//! Streaming CSV and JSONL uploads.
//!
//! Uploads are never buffered whole. CSV parsing is synchronous (the `csv`
//! crate reads from `std::io::Read`), so it runs on a blocking thread over
//! a `SyncIoBridge`; parsed rows flow back through a bounded channel, which
//! is also the backpressure boundary. JSONL parses line by line on the
//! async side.

use bytes::Bytes;
use futures::Stream;
use opine_core::model::BatchCounters;
use opine_error::{OpineError, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{info, warn};
use uuid::Uuid;

use crate::rows::{csv_layout, parse_jsonl_line, RawRow, RowProcessor};
use crate::{IngestPipeline, UPLOAD_CHUNK_ROWS};

/// Result of a streaming upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Batch identifier.
    pub batch_id: Uuid,
    /// Aggregate enrichment job identifier.
    pub job_id: Uuid,
    /// Per-row outcome counters.
    pub counters: BatchCounters,
}

/// Messages from the parser to the persistence loop.
enum ParsedRow {
    /// A parsed row.
    Row(RawRow),
    /// One malformed row; the batch continues.
    RowError(String),
    /// The whole upload is unusable (e.g., no body column).
    Fatal(String),
}

impl IngestPipeline {
    /// Stream-ingest a CSV upload.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` when the header has no body column,
    /// or the classified database/queue error.
    pub async fn upload_csv<S>(&self, source: &str, body: S) -> Result<UploadOutcome>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel::<ParsedRow>(1_024);
        let reader = StreamReader::new(body);

        let parser = tokio::task::spawn_blocking(move || {
            let bridge = SyncIoBridge::new(reader);
            let mut csv_reader = csv::ReaderBuilder::new()
                .flexible(true)
                .from_reader(bridge);

            let layout = match csv_reader.headers().map_err(|e| e.to_string()) {
                Ok(headers) => match csv_layout(headers) {
                    Ok(layout) => layout,
                    Err(e) => {
                        let _ = tx.blocking_send(ParsedRow::Fatal(e.to_string()));
                        return;
                    },
                },
                Err(e) => {
                    let _ = tx.blocking_send(ParsedRow::Fatal(e));
                    return;
                },
            };

            for record in csv_reader.records() {
                let message = match record {
                    Ok(record) => ParsedRow::Row(layout.extract(&record)),
                    Err(e) => ParsedRow::RowError(e.to_string()),
                };
                if tx.blocking_send(message).is_err() {
                    // Consumer bailed; stop reading the upload.
                    return;
                }
            }
        });

        let outcome = self.consume_rows(source, rx).await;
        // Parser ends when the channel closes either way; surface its panic
        // if it had one.
        if let Err(join_err) = parser.await {
            warn!(error = %join_err, "csv parser task failed");
        }
        outcome
    }

    /// Stream-ingest a JSONL upload.
    ///
    /// # Errors
    ///
    /// Returns the classified database/queue error.
    pub async fn upload_jsonl<S>(&self, source: &str, body: S) -> Result<UploadOutcome>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel::<ParsedRow>(1_024);

        let reader = BufReader::new(StreamReader::new(body));
        let feeder = tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let message = match parse_jsonl_line(&line) {
                            Ok(row) => ParsedRow::Row(row),
                            Err(e) => ParsedRow::RowError(e.to_string()),
                        };
                        if tx.send(message).await.is_err() {
                            return;
                        }
                    },
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(ParsedRow::Fatal(format!("read error: {e}"))).await;
                        return;
                    },
                }
            }
        });

        let outcome = self.consume_rows(source, rx).await;
        if let Err(join_err) = feeder.await {
            warn!(error = %join_err, "jsonl feeder task failed");
        }
        outcome
    }

    /// Shared persistence loop: dedup, gate, chunk, persist, enqueue.
    async fn consume_rows(
        &self,
        source: &str,
        mut rx: mpsc::Receiver<ParsedRow>,
    ) -> Result<UploadOutcome> {
        if source.trim().is_empty() {
            return Err(OpineError::validation_field("source must not be empty", "source"));
        }

        let batch_id = Uuid::new_v4();
        self.batch_repo().create(batch_id, source).await?;

        let mut processor = RowProcessor::new(source, batch_id, self.english_only());
        let mut counters = BatchCounters::default();
        let mut chunk = Vec::with_capacity(UPLOAD_CHUNK_ROWS);

        while let Some(message) = rx.recv().await {
            match message {
                ParsedRow::Row(raw) => {
                    let (outcome, record) = processor.process(raw);
                    counters.record(&outcome);
                    if let Some(record) = record {
                        chunk.push(record);
                        if chunk.len() >= UPLOAD_CHUNK_ROWS {
                            self.feedback_repo().insert_chunk(&chunk).await?;
                            chunk.clear();
                        }
                    }
                },
                ParsedRow::RowError(message) => {
                    counters.record(&opine_core::model::RowOutcome::Error(message));
                },
                ParsedRow::Fatal(message) => {
                    return Err(OpineError::validation(message));
                },
            }
        }
        self.feedback_repo().insert_chunk(&chunk).await?;

        let job_id = self.enqueue_ingest(batch_id).await?;
        self.batch_repo()
            .finalize(batch_id, &counters, Some(job_id))
            .await?;

        info!(
            batch_id = %batch_id,
            processed = counters.processed_count,
            created = counters.created_count,
            duplicates = counters.duplicate_count,
            errors = counters.error_count,
            skipped_non_english = counters.skipped_non_english_count,
            "upload ingested"
        );
        Ok(UploadOutcome {
            batch_id,
            job_id,
            counters,
        })
    }
}
