//! Cache backend implementations.

use super::key::CacheKey;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// One stored response. Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Arc<Value>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: Arc<Value>, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub fn value(&self) -> &Arc<Value> {
        &self.value
    }

    /// `now - stored_at < ttl`, with `ttl_override` replacing the stored TTL when given.
    pub fn is_fresh(&self, ttl_override: Option<Duration>) -> bool {
        self.stored_at.elapsed() < ttl_override.unwrap_or(self.ttl)
    }
}

/// Storage behind the cache manager. Freshness is the manager's concern; backends keep stale
/// entries so they can be served as fallbacks.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<()>;
    fn contains(&self, key: &CacheKey) -> Result<bool>;
    /// Remove every entry whose key satisfies `pred`, returning how many went.
    fn remove_where(&self, pred: &dyn Fn(&CacheKey) -> bool) -> Result<usize>;
    fn clear(&self) -> Result<()>;
    fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// In-memory map. Unbounded unless `max_entries` is given, in which case the oldest write is
/// evicted to make room.
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    max_entries: Option<usize>,
}

impl MemoryCache {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.map(|n| n.max(1)),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    // Entries are replaced whole, so a panicking holder cannot leave one half-written.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict_if_needed(&self, entries: &mut HashMap<CacheKey, CacheEntry>, incoming: &CacheKey) {
        let Some(max) = self.max_entries else {
            return;
        };
        if entries.contains_key(incoming) {
            return;
        }
        while entries.len() >= max {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        let mut entries = self.lock();
        self.evict_if_needed(&mut entries, key);
        entries.insert(key.clone(), entry);
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock().contains_key(key))
    }

    fn remove_where(&self, pred: &dyn Fn(&CacheKey) -> bool) -> Result<usize> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| !pred(k));
        Ok(before - entries.len())
    }

    fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock().len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Caching disabled: every read misses, every write is dropped.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for NullCache {
    fn get(&self, _: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(None)
    }
    fn set(&self, _: &CacheKey, _: CacheEntry) -> Result<()> {
        Ok(())
    }
    fn contains(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    fn remove_where(&self, _: &dyn Fn(&CacheKey) -> bool) -> Result<usize> {
        Ok(0)
    }
    fn clear(&self) -> Result<()> {
        Ok(())
    }
    fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
