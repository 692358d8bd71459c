//! In-memory response cache: TTL on read, LRU on insert.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug)]
struct Entry {
    body: Arc<str>,
    stored_at: Instant,
}

#[derive(Debug)]
struct Inner {
    entries: Option<LruCache<String, Entry>>,
    stats: CacheStats,
}

/// Response bodies keyed by full request URL.
///
/// A zero TTL or zero capacity turns the cache into a no-op that still
/// counts misses.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let entries = if ttl.is_zero() {
            None
        } else {
            NonZeroUsize::new(capacity).map(LruCache::new)
        };
        Self {
            ttl,
            inner: Mutex::new(Inner { entries, stats: CacheStats::default() }),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        let Inner { entries, stats } = &mut *inner;
        let Some(entries) = entries else {
            stats.misses += 1;
            return None;
        };

        let expired = match entries.get(key) {
            Some(e) if e.stored_at.elapsed() < self.ttl => {
                stats.hits += 1;
                return Some(Arc::clone(&e.body));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            stats.expirations += 1;
            trace!(key, "cache entry expired");
        }
        stats.misses += 1;
        None
    }

    pub fn put(&self, key: impl Into<String>, body: Arc<str>) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let Inner { entries, stats } = &mut *inner;
        let Some(entries) = entries else {
            return;
        };
        let key = key.into();
        let entry = Entry { body, stored_at: Instant::now() };
        if let Some((old_key, _)) = entries.push(key.clone(), entry) {
            if old_key != key {
                stats.evictions += 1;
                trace!(evicted = %old_key, "cache entry evicted");
            }
        }
        stats.inserts += 1;
    }

    /// Change capacity, evicting least-recently-used entries when shrinking.
    /// A capacity of zero is clamped to one so the cache stays usable.
    pub fn resize(&self, capacity: usize) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let Inner { entries, stats } = &mut *inner;
        let Some(entries) = entries else {
            return;
        };
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let before = entries.len();
        entries.resize(cap);
        stats.evictions += before.saturating_sub(entries.len()) as u64;
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let Inner { entries, stats } = &mut *inner;
        let Some(entries) = entries else {
            return 0;
        };
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.stored_at.elapsed() >= self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &stale {
            entries.pop(k);
        }
        stats.expirations += stale.len() as u64;
        stale.len()
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(entries) = inner.entries.as_mut() {
                entries.clear();
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        match self.inner.lock() {
            Ok(inner) => {
                let (len, capacity) = inner
                    .entries
                    .as_ref()
                    .map(|e| (e.len(), e.cap().get()))
                    .unwrap_or((0, 0));
                CacheStats { len, capacity, ..inner.stats }
            }
            Err(_) => CacheStats::default(),
        }
    }
}
