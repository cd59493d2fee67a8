//! In-Memory TTL Cache Module
//!
//! Thread-safe key/value store with per-entry expiry, backed by DashMap so
//! concurrent handlers never contend on a global lock. Used for OTP codes
//! and login sessions.
//!
//! Features:
//! - TTL-based expiration, checked on read and swept periodically
//! - Key normalization (trimmed, lowercase)
//! - Hit/miss counters for monitoring

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache entry with its own deadline
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }

    /// Seconds left before expiry
    pub fn remaining_ttl(&self) -> u64 {
        self.ttl.saturating_sub(self.created_at.elapsed()).as_secs()
    }
}

#[derive(Clone)]
pub struct TtlCache<V> {
    /// Internal storage: normalized key -> entry
    store: Arc<DashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    /// Counters for statistics
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    /// Label used in log lines
    name: &'static str,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            name,
        }
    }

    #[inline]
    fn normalize_key(key: &str) -> String {
        key.trim().to_lowercase()
    }

    /// Returns the value when present and not expired. Expired entries are
    /// removed on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        let key = Self::normalize_key(key);

        if let Some(entry) = self.store.get(&key) {
            if entry.is_expired() {
                drop(entry); // release read lock before removing
                self.store.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 {} MISS (expired)", self.name);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✅ {} HIT (TTL: {}s remaining)", self.name, entry.remaining_ttl());
                Some(entry.value.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 {} MISS", self.name);
            None
        }
    }

    /// Insert or replace with the cache's default TTL
    pub fn set(&self, key: &str, value: V) {
        let key = Self::normalize_key(key);
        self.store.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl: self.ttl,
            },
        );
    }

    /// Mutate a live entry in place without touching its deadline. Returns
    /// the closure's result, or `None` when the key is missing or expired.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let key = Self::normalize_key(key);
        let mut entry = self.store.get_mut(&key)?;
        if entry.is_expired() {
            drop(entry);
            self.store.remove(&key);
            return None;
        }
        Some(f(&mut entry.value))
    }

    /// Remove and return a live entry
    pub fn take(&self, key: &str) -> Option<V> {
        let key = Self::normalize_key(key);
        self.store
            .remove(&key)
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(_, entry)| entry.value)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.store.remove(&Self::normalize_key(key)).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        before - self.store.len()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_set_get() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.set("jane@rei.ug", 42u32);
        assert_eq!(cache.get("jane@rei.ug"), Some(42));
    }

    #[test]
    fn test_key_normalization() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.set(" Jane@REI.ug ", 1u32);
        assert_eq!(cache.get("jane@rei.ug"), Some(1));
    }

    #[test]
    fn test_expired_entry_is_gone() {
        let cache = TtlCache::new("test", Duration::ZERO);
        cache.set("k", 1u32);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.update("k", |v| *v += 1), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_update_and_take() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.set("k", 1u32);
        assert_eq!(cache.update("k", |v| { *v += 1; *v }), Some(2));
        assert_eq!(cache.take("k"), Some(2));
        assert_eq!(cache.take("k"), None);
    }

    #[test]
    fn test_cleanup_and_stats() {
        let cache = TtlCache::new("test", Duration::ZERO);
        cache.set("a", 1u32);
        cache.set("b", 2u32);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.cleanup_expired(), 2);

        let live = TtlCache::new("test", Duration::from_secs(60));
        live.set("a", 1u32);
        live.get("a"); // HIT
        live.get("nope"); // MISS
        let stats = live.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
