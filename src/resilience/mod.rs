//! # Request Shaping Primitives
//!
//! The two mechanisms that keep many uncoordinated callers from hammering one endpoint.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`inflight`] | At most one pending request per cache key; later callers join it |
//! | [`cooldown`] | Short per-key window during which no new dispatch may start |
//!
//! ## In-Flight Registry
//!
//! ```rust
//! use campus_client::cache::{build_key, TenantContext};
//! use campus_client::resilience::inflight::InflightRegistry;
//! use futures::FutureExt;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry: Arc<InflightRegistry<u32>> = Arc::new(InflightRegistry::new());
//! let key = build_key("/classes", None, &TenantContext::new());
//! let slot = registry.get_or_create(&key, |guard| {
//!     async move {
//!         let _guard = guard;
//!         42
//!     }
//!     .boxed()
//! });
//! assert_eq!(slot.into_request().await, 42);
//! assert!(registry.is_empty());
//! # });
//! ```
//!
//! ## Cooldown Gate
//!
//! A mark is armed on dispatch, and after the request settles it lingers for the window
//! (1000 ms by default). A caller arriving during the window is served from cache, joins the
//! pending request, or gets an explicit [`Error::CooldownRejected`](crate::Error::CooldownRejected).

pub mod cooldown;
pub mod inflight;
