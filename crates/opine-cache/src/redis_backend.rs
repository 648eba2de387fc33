//! Redis cache backend.
//!
//! Uses `SET ... EX` for TTL writes and cursor-based `SCAN` for prefix
//! deletion. Every backend failure is logged at warn level and surfaces as
//! a miss or a no-op; the request being served never observes it.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::warn;

use crate::Cache;

/// Redis-backed TTL cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to the given Redis URL.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` when the initial connection fails.
    pub async fn connect(url: &str) -> opine_error::Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| opine_error::OpineError::unavailable("cache", e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| opine_error::OpineError::unavailable("cache", e.to_string()))?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result: redis::RedisResult<Option<Vec<u8>>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await;
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "cache get failed, treating as miss");
                None
            },
        }
    }

    async fn set_ttl(&self, key: &str, value: &[u8], ttl: Duration) {
        let ttl_secs = ttl.as_secs().max(1);
        let result: redis::RedisResult<()> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut self.conn.clone())
            .await;
        if let Err(e) = result {
            warn!(key, error = %e, "cache set failed, skipping");
        }
    }

    async fn delete(&self, key: &str) {
        let result: redis::RedisResult<()> = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await;
        if let Err(e) = result {
            warn!(key, error = %e, "cache delete failed, skipping");
        }
    }

    async fn delete_prefix(&self, prefix: &str) {
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        loop {
            let scanned: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut self.conn.clone())
                .await;

            let (next, keys) = match scanned {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(prefix, error = %e, "cache prefix scan failed, skipping");
                    return;
                },
            };

            if !keys.is_empty() {
                let mut del = redis::cmd("DEL");
                for key in &keys {
                    del.arg(key);
                }
                let result: redis::RedisResult<()> =
                    del.query_async(&mut self.conn.clone()).await;
                if let Err(e) = result {
                    warn!(prefix, error = %e, "cache prefix delete failed, skipping");
                    return;
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_cache_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<RedisCache>();
    }
}
