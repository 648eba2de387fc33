//! Keyed TTL cache over analytics results and query-suggestion payloads.
//!
//! The adapter is oblivious to value semantics: keys are strings, values are
//! opaque bytes. A missing or failing backend degrades to a transparent
//! cache miss; no cache operation ever fails the request it serves.

mod memory;
mod redis_backend;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryCache;
pub use redis_backend::RedisCache;

/// Cache adapter operations.
///
/// Implementations must be infallible from the caller's point of view:
/// backend errors are logged and reported as misses / no-ops.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value. `None` on miss, expiry, or backend failure.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value with a TTL.
    async fn set_ttl(&self, key: &str, value: &[u8], ttl: Duration);

    /// Delete one key.
    async fn delete(&self, key: &str);

    /// Delete every key starting with `prefix`. An empty prefix clears the
    /// whole keyspace this adapter owns.
    async fn delete_prefix(&self, prefix: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        cache.set_ttl("analytics:summary:abc", b"payload", Duration::from_secs(60)).await;
        assert_eq!(
            cache.get("analytics:summary:abc").await,
            Some(b"payload".to_vec())
        );
    }

    #[tokio::test]
    async fn test_memory_cache_miss() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("absent").await, None);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set_ttl("k", b"v", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_memory_cache_delete_prefix() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set_ttl("analytics:topics:a", b"1", ttl).await;
        cache.set_ttl("analytics:sources:b", b"2", ttl).await;
        cache.set_ttl("suggestions:c", b"3", ttl).await;

        cache.delete_prefix("analytics:").await;

        assert_eq!(cache.get("analytics:topics:a").await, None);
        assert_eq!(cache.get("analytics:sources:b").await, None);
        assert_eq!(cache.get("suggestions:c").await, Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_cache_clear_with_empty_prefix() {
        let cache = MemoryCache::new();
        cache.set_ttl("a", b"1", Duration::from_secs(60)).await;
        cache.set_ttl("b", b"2", Duration::from_secs(60)).await;

        cache.delete_prefix("").await;

        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
    }
}
