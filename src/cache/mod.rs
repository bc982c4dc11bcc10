//! # Response Caching Module
//!
//! TTL cache for successful GET responses, keyed by request identity including the tenant the
//! request was made for.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`build_key`] | Derives a [`CacheKey`] from endpoint, params and [`TenantContext`] |
//! | [`CacheManager`] | TTL store with stale reads, statistics and error swallowing |
//! | [`CacheBackend`] | Trait for implementing custom storage |
//! | [`MemoryCache`] | In-memory map, optionally bounded |
//! | [`NullCache`] | No-op backend for disabling caching |
//!
//! ## Example
//!
//! ```rust
//! use campus_client::cache::{build_key, CacheManager, MemoryCache, Params, ReadOptions, TenantContext};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = CacheManager::new(Box::new(MemoryCache::unbounded()));
//! let key = build_key(
//!     "/courses",
//!     Some(&Params::new().with("page", 1)),
//!     &TenantContext::new().institute("inst-1"),
//! );
//! cache.set(&key, Arc::new(serde_json::json!([])), Duration::from_secs(30));
//! assert!(cache.get(&key, ReadOptions::fresh()).is_some());
//! ```
//!
//! Entries are kept past their TTL so they can serve as fallbacks; they leave the store only
//! through invalidation, `clear`, or eviction from a bounded [`MemoryCache`].

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, CacheEntry, MemoryCache, NullCache};
pub use key::{build_key, endpoint_family, CacheKey, Params, Scalar, TenantContext};
pub use manager::{CacheManager, CacheStats, Lookup, ReadOptions};
