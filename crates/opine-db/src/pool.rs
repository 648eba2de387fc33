//! Connection pool construction and health probing.

use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use opine_core::AppConfig;
use opine_error::{OpineError, Result};
use tokio_postgres::NoTls;

use crate::error::{classify_pg_error, classify_pool_error};

/// Pool gauge snapshot for health and stats endpoints.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Connections checked out.
    pub active: usize,
    /// Connections idle in the pool.
    pub idle: usize,
    /// Configured maximum.
    pub max_size: usize,
}

/// Create the connection pool and probe it with `SELECT 1`.
///
/// Capacity is the configured pool size plus overflow.
///
/// # Errors
///
/// Returns `OpineError::ConnectionPool` when pool creation or the startup
/// probe fails.
pub async fn connect(config: &AppConfig) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.url = Some(config.database_url.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.db_pool_capacity()));

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| OpineError::ConnectionPool {
            message: format!("failed to create connection pool: {e}"),
        })?;

    // Startup probe: fail fast on a bad URL rather than at first request.
    let client = pool.get().await.map_err(|e| classify_pool_error(&e))?;
    client
        .query_one("SELECT 1", &[])
        .await
        .map_err(|e| classify_pg_error(&e))?;

    Ok(pool)
}

/// Create the connection pool without the startup probe.
///
/// Connections open lazily at first checkout; callers that tolerate a cold
/// backend (tests, tooling) use this instead of [`connect`].
///
/// # Errors
///
/// Returns `OpineError::ConnectionPool` when the pool configuration is
/// invalid.
pub fn connect_lazy(config: &AppConfig) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.url = Some(config.database_url.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.db_pool_capacity()));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| OpineError::ConnectionPool {
            message: format!("failed to create connection pool: {e}"),
        })
}

/// Probe the database through the pool.
///
/// # Errors
///
/// Returns the classified pool or statement error.
pub async fn health_check(pool: &Pool) -> Result<()> {
    let client = pool.get().await.map_err(|e| classify_pool_error(&e))?;
    client
        .query_one("SELECT 1", &[])
        .await
        .map_err(|e| classify_pg_error(&e))?;
    Ok(())
}

/// Snapshot current pool gauges.
#[must_use]
pub fn stats(pool: &Pool) -> PoolStats {
    let status = pool.status();
    PoolStats {
        active:   status.size.saturating_sub(status.available),
        idle:     status.available,
        max_size: status.max_size,
    }
}
