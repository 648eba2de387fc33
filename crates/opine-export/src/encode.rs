//! CSV chunk encoding.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use opine_error::{OpineError, Result};

/// Encode one batch of records (optionally with a header) to CSV bytes.
///
/// Quoting follows RFC 4180 via the `csv` crate's defaults.
///
/// # Errors
///
/// Returns `OpineError::Serialization` on a write failure.
pub fn records_to_csv_bytes(header: Option<&[&str]>, records: &[Vec<String>]) -> Result<Bytes> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    if let Some(header) = header {
        writer
            .write_record(header)
            .map_err(|e| OpineError::serialization(e.to_string()))?;
    }
    for record in records {
        writer
            .write_record(record)
            .map_err(|e| OpineError::serialization(e.to_string()))?;
    }
    let inner = writer
        .into_inner()
        .map_err(|e| OpineError::serialization(e.to_string()))?;
    Ok(Bytes::from(inner))
}

/// Turn a stream of record batches into a stream of CSV byte chunks.
///
/// The header is its own first chunk, emitted before any database row
/// arrives. An `Err` batch ends the stream after surfacing the error.
pub fn csv_byte_stream<S>(
    header: &[&str],
    records: S,
) -> impl Stream<Item = Result<Bytes>> + Send
where
    S: Stream<Item = Result<Vec<Vec<String>>>> + Send + 'static,
{
    let header_chunk = records_to_csv_bytes(Some(header), &[]);

    let body = records.map(|batch| batch.and_then(|rows| records_to_csv_bytes(None, &rows)));
    futures::stream::once(async move { header_chunk }).chain(body)
}
