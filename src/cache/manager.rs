//! Cache manager.
//!
//! Wraps a backend so that a failing cache never fails a request: read errors degrade to a miss,
//! write errors are logged and dropped.

use super::backend::{CacheBackend, CacheEntry};
use super::key::CacheKey;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Read behaviour for [`CacheManager::get`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Judge freshness against this TTL instead of the one stored with the entry.
    pub ttl: Option<Duration>,
    /// Return the entry regardless of age.
    pub accept_stale: bool,
}

impl ReadOptions {
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn any_age() -> Self {
        Self {
            ttl: None,
            accept_stale: true,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Outcome of a single cache probe.
#[derive(Debug, Clone)]
pub enum Lookup {
    Fresh(Arc<Value>),
    Stale(Arc<Value>),
    Miss,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_reads: u64,
    pub writes: u64,
    pub invalidated: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_reads: AtomicU64,
    writes: AtomicU64,
    invalidated: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_reads: self.stale_reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// TTL store over a pluggable backend. Context-agnostic: tenant isolation comes entirely from
/// the key.
pub struct CacheManager {
    backend: Box<dyn CacheBackend>,
    stats: AtomicStats,
}

impl CacheManager {
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        Self {
            backend,
            stats: AtomicStats::default(),
        }
    }

    /// Probe without deciding: reports whether the entry is fresh, stale or absent.
    pub fn lookup(&self, key: &CacheKey, ttl: Option<Duration>) -> Lookup {
        match self.backend.get(key) {
            Ok(Some(entry)) if entry.is_fresh(ttl) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache_key = %key.digest(), endpoint = key.endpoint(), "cache hit");
                Lookup::Fresh(entry.value().clone())
            }
            Ok(Some(entry)) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(cache_key = %key.digest(), endpoint = key.endpoint(), "cache entry stale");
                Lookup::Stale(entry.value().clone())
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Lookup::Miss
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, endpoint = key.endpoint(), "cache read failed, treating as miss");
                Lookup::Miss
            }
        }
    }

    /// Fresh value, or any value when `accept_stale` is set.
    pub fn get(&self, key: &CacheKey, options: ReadOptions) -> Option<Arc<Value>> {
        match self.lookup(key, options.ttl) {
            Lookup::Fresh(v) => Some(v),
            Lookup::Stale(v) if options.accept_stale => {
                self.stats.stale_reads.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            Lookup::Stale(_) | Lookup::Miss => None,
        }
    }

    /// Whatever is cached for `key`, regardless of age, to serve in place of a dispatch. The
    /// caller's earlier [`lookup`](Self::lookup) already counted the hit or miss; this only
    /// counts a stale read.
    pub fn fallback(&self, key: &CacheKey) -> Option<Arc<Value>> {
        match self.backend.get(key) {
            Ok(Some(entry)) => {
                if !entry.is_fresh(None) {
                    self.stats.stale_reads.fetch_add(1, Ordering::Relaxed);
                }
                Some(entry.value().clone())
            }
            Ok(None) => None,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, endpoint = key.endpoint(), "cache read failed, no fallback");
                None
            }
        }
    }

    /// Unconditional overwrite. Never fails the caller.
    pub fn set(&self, key: &CacheKey, value: Arc<Value>, ttl: Duration) {
        match self.backend.set(key, CacheEntry::new(value, ttl)) {
            Ok(()) => {
                self.stats.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, endpoint = key.endpoint(), "cache write failed, response not cached");
            }
        }
    }

    /// Whether any entry exists, fresh or not.
    pub fn has(&self, key: &CacheKey) -> bool {
        self.backend.contains(key).unwrap_or_else(|e| {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "cache probe failed");
            false
        })
    }

    pub fn invalidate_where(&self, pred: &dyn Fn(&CacheKey) -> bool) -> usize {
        match self.backend.remove_where(pred) {
            Ok(n) => {
                self.stats.invalidated.fetch_add(n as u64, Ordering::Relaxed);
                n
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "cache invalidation failed");
                0
            }
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.backend.clear() {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "cache clear failed");
        }
    }

    pub fn len(&self) -> usize {
        self.backend.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
