//! In-memory translation cache with TTL and insertion-order eviction.
//! Key: blake3 hash of (src_lang | tgt_lang | text), each field length-prefixed.
//! Capacity: 1000, TTL: 24 hours.
//!
//! Eviction is FIFO: lookups use `peek`, so reads never move an entry and the
//! LRU tail is always the oldest insertion.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

pub const MAX_CACHE_SIZE: usize = 1000;
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

struct CacheEntry {
    translated_text: String,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
}

pub struct TranslationCache {
    inner: Mutex<LruCache<[u8; 32], CacheEntry>>,
    ttl: Duration,
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(MAX_CACHE_SIZE, CACHE_TTL)
    }
}

impl TranslationCache {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Compute the cache key from translation parameters.
    pub fn compute_key(src_lang: &str, tgt_lang: &str, text: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for field in [src_lang, tgt_lang, text] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    /// Look up a cached translation. Returns None if absent or expired.
    pub fn lookup(&self, key: &[u8; 32]) -> Option<String> {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.peek(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.translated_text.clone());
            }
            // Expired
            cache.pop(key);
            debug!("cache entry expired");
        }
        None
    }

    /// Insert a translation. At capacity the oldest insertion is evicted.
    pub fn store(&self, key: [u8; 32], translated_text: String) {
        let mut cache = self.inner.lock();
        let entry = CacheEntry {
            translated_text,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = cache.push(key, entry) {
            if evicted != key {
                debug!(size = cache.len(), "cache full, evicted oldest entry");
            }
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.inner.lock();
        CacheStats {
            size: cache.len(),
            max_size: cache.cap().get(),
        }
    }
}
