use crate::cache::CacheStats;
use crate::resilience::cooldown::CooldownSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a client's caching behaviour. Facts only.
#[derive(Debug, Clone, Default)]
pub struct SignalsSnapshot {
    pub family: String,
    pub transport: &'static str,
    pub cache_backend: &'static str,
    pub cache: CacheStats,
    pub cached_entries: usize,
    pub pending_requests: usize,
    pub cooldown: CooldownSnapshot,
    pub calls: CallCounters,
}

/// How reads were satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounters {
    /// Requests actually sent for reads.
    pub dispatches: u64,
    /// Reads that joined an already pending request.
    pub joins: u64,
    pub cooldown_rejections: u64,
    /// Stale entries served because of a cooldown or an upstream failure.
    pub stale_fallbacks: u64,
    pub background_refreshes: u64,
    pub mutations: u64,
}

#[derive(Default)]
pub(crate) struct AtomicCounters {
    pub(crate) dispatches: AtomicU64,
    pub(crate) joins: AtomicU64,
    pub(crate) cooldown_rejections: AtomicU64,
    pub(crate) stale_fallbacks: AtomicU64,
    pub(crate) background_refreshes: AtomicU64,
    pub(crate) mutations: AtomicU64,
}

impl AtomicCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CallCounters {
        CallCounters {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            cooldown_rejections: self.cooldown_rejections.load(Ordering::Relaxed),
            stale_fallbacks: self.stale_fallbacks.load(Ordering::Relaxed),
            background_refreshes: self.background_refreshes.load(Ordering::Relaxed),
            mutations: self.mutations.load(Ordering::Relaxed),
        }
    }
}
