//! # campus-client
//!
//! Client-side request caching for a multi-tenant education platform's REST API.
//!
//! ## Overview
//!
//! Many independent callers load and poll the same endpoints. This crate sits between them and
//! the network and guarantees:
//!
//! - **At most one in-flight request per key**: concurrent identical reads share one dispatch
//! - **No cross-tenant reuse**: the tenant context is part of every cache key
//! - **Bounded re-dispatch**: a per-key cooldown stops identical requests from hammering the API
//! - **Fresh reads after writes**: successful mutations invalidate the reads they may change
//!
//! One engine serves every API family; the differences (origin, TTL, invalidation rules,
//! stale-while-revalidate) live in [`ApiFamily`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campus_client::{ApiFamily, CacheClient, Params, RequestOptions, TenantContext};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> campus_client::Result<()> {
//!     let client = CacheClient::builder()
//!         .family(ApiFamily::general())
//!         .base_url("https://api.example.edu")
//!         .build()?;
//!
//!     let options = RequestOptions::new().tenant(TenantContext::new().institute("inst-1"));
//!     let courses: Value = client
//!         .get("/courses", Some(&Params::new().with("page", 1)), &options)
//!         .await?;
//!     println!("{courses}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Key builder, TTL store and backends |
//! | [`resilience`] | Cooldown gate and in-flight request registry |
//! | [`client`] | Facade, builder, HTTP executor, collaborator traits |
//! | [`transport`] | Fetch-like transport seam and the reqwest implementation |
//! | [`config`] | Per-API-family configuration |

pub mod cache;
pub mod client;
pub mod config;
pub mod resilience;
pub mod transport;

// Re-export main types for convenience
pub use cache::{CacheKey, Params, Scalar, TenantContext};
pub use client::{
    BearerTokenProvider, CacheClient, CacheClientBuilder, HeaderProvider, OriginResolver,
    RequestOptions, SignalsSnapshot, StaticOrigin, SwitchableOrigin,
};
pub use config::{ApiFamily, InvalidationRule, OriginSlot};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, MarkupDiagnosis};
