//! The caching client facade.
//!
//! Keep the public surface small: build a [`CacheClient`] per API family, then call
//! `get/post/put/patch/delete`. Implementation details are split into submodules under
//! `src/client/`.

pub mod builder;
pub mod collaborators;
pub mod core;
mod error_classification;
pub mod execution;
pub mod options;
pub mod signals;

pub use builder::CacheClientBuilder;
pub use collaborators::{
    BearerTokenProvider, HeaderProvider, NoAuth, OriginResolver, StaticOrigin, SwitchableOrigin,
};
pub use core::CacheClient;
pub use execution::HttpExecutor;
pub use options::RequestOptions;
pub use signals::{CallCounters, SignalsSnapshot};
