//! Materialised-view refresh.

use deadpool_postgres::Pool;
use opine_error::Result;
use tracing::debug;

use crate::error::{classify_pg_error, classify_pool_error};

/// Refresh `daily_feedback_aggregates`.
///
/// Tries `CONCURRENTLY` first so readers never block; falls back to a
/// plain refresh when the concurrent path is unavailable (view never
/// populated, or unique index missing on an old schema).
///
/// # Errors
///
/// Returns the classified database error when both refresh paths fail.
pub async fn refresh_daily_aggregates(pool: &Pool) -> Result<()> {
    let client = pool.get().await.map_err(|e| classify_pool_error(&e))?;

    match client
        .batch_execute("REFRESH MATERIALIZED VIEW CONCURRENTLY daily_feedback_aggregates")
        .await
    {
        Ok(()) => {
            debug!("materialised view refreshed concurrently");
            Ok(())
        },
        Err(concurrent_err) => {
            debug!(error = %concurrent_err, "concurrent refresh unavailable, retrying plain");
            client
                .batch_execute("REFRESH MATERIALIZED VIEW daily_feedback_aggregates")
                .await
                .map_err(|e| classify_pg_error(&e))
        },
    }
}
