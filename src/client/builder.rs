use super::collaborators::{HeaderProvider, NoAuth, OriginResolver, StaticOrigin};
use super::core::{CacheClient, Inner};
use super::execution::HttpExecutor;
use super::signals::AtomicCounters;
use crate::cache::{CacheBackend, CacheManager, MemoryCache, NullCache};
use crate::config::ApiFamily;
use crate::resilience::cooldown::CooldownGate;
use crate::resilience::inflight::InflightRegistry;
use crate::transport::{ReqwestTransport, Transport};
use crate::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;

/// Builder for [`CacheClient`].
///
/// Everything has a default: the general API family, no credentials, no origin (calls fail with
/// a configuration error until one is supplied), an in-memory cache and a reqwest transport.
pub struct CacheClientBuilder {
    family: ApiFamily,
    origins: Option<Arc<dyn OriginResolver>>,
    headers: Option<Arc<dyn HeaderProvider>>,
    transport: Option<Arc<dyn Transport>>,
    backend: Option<Box<dyn CacheBackend>>,
    env_overrides: bool,
}

impl CacheClientBuilder {
    pub fn new() -> Self {
        Self {
            family: ApiFamily::general(),
            origins: None,
            headers: None,
            transport: None,
            backend: None,
            env_overrides: true,
        }
    }

    pub fn family(mut self, family: ApiFamily) -> Self {
        self.family = family;
        self
    }

    /// Shorthand for a fixed primary origin.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.origins = Some(Arc::new(StaticOrigin::new(url)));
        self
    }

    pub fn origin_resolver(mut self, origins: Arc<dyn OriginResolver>) -> Self {
        self.origins = Some(origins);
        self
    }

    pub fn header_provider(mut self, headers: Arc<dyn HeaderProvider>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Replace the network layer (tests, custom stacks).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache_backend(mut self, backend: Box<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Skip `CAMPUS_CACHE_TTL_SECS`, `CAMPUS_COOLDOWN_MS` and `CAMPUS_CACHE_DISABLED`.
    pub fn ignore_env(mut self) -> Self {
        self.env_overrides = false;
        self
    }

    pub fn build(self) -> Result<CacheClient> {
        let family = if self.env_overrides {
            self.family.with_env_overrides()
        } else {
            self.family
        };
        family.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::from_env()?),
        };
        let origins = self
            .origins
            .unwrap_or_else(|| Arc::new(StaticOrigin::unconfigured()));
        let headers = self.headers.unwrap_or_else(|| Arc::new(NoAuth));
        let backend: Box<dyn CacheBackend> = match self.backend {
            Some(b) => b,
            None if family.cache_enabled => Box::new(MemoryCache::new(family.max_entries)),
            None => Box::new(NullCache::new()),
        };

        debug!(
            family = %family.name,
            transport = transport.name(),
            cache = backend.name(),
            default_ttl_secs = family.default_ttl_secs,
            cooldown_ms = family.cooldown_ms,
            "building cache client"
        );

        let executor = HttpExecutor::new(&family, transport, origins, headers);
        let gate = CooldownGate::new(family.cooldown());
        Ok(CacheClient::from_inner(Inner {
            executor: Arc::new(executor),
            cache: Arc::new(CacheManager::new(backend)),
            gate: Arc::new(gate),
            registry: Arc::new(InflightRegistry::new()),
            counters: Arc::new(AtomicCounters::default()),
            disposed: AtomicBool::new(false),
            family,
        }))
    }
}

impl Default for CacheClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheClient {
    pub fn builder() -> CacheClientBuilder {
        CacheClientBuilder::new()
    }

    /// A client for `family` against `origins`, with default credentials and transport.
    pub fn create(family: ApiFamily, origins: Arc<dyn OriginResolver>) -> Result<Self> {
        Self::builder()
            .family(family)
            .origin_resolver(origins)
            .build()
    }
}
