//! In-process cache backend.
//!
//! Used in tests and in deployments without a cache URL. Entries expire
//! lazily on read; `delete_prefix` also sweeps expired entries.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::Cache;

/// In-memory TTL cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Vec<u8>, Instant)>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next touch).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, deadline) = entry.value();
                if Instant::now() < *deadline {
                    return Some(value.clone());
                }
                true
            },
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    async fn set_ttl(&self, key: &str, value: &[u8], ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn delete_prefix(&self, prefix: &str) {
        let now = Instant::now();
        self.entries
            .retain(|key, (_, deadline)| !key.starts_with(prefix) && *deadline > now);
    }
}
