use super::execution::HttpExecutor;
use super::options::RequestOptions;
use super::signals::{AtomicCounters, SignalsSnapshot};
use crate::cache::{
    build_key, endpoint_family, CacheKey, CacheManager, Lookup, Params, ReadOptions,
    TenantContext,
};
use crate::config::ApiFamily;
use crate::resilience::cooldown::CooldownGate;
use crate::resilience::inflight::{InflightRegistry, SharedRequest, Slot};
use crate::transport::Method;
use crate::{Error, ErrorContext, Result};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What every caller joined onto one dispatch receives.
pub(crate) type Outcome = std::result::Result<Arc<Value>, Error>;

pub(crate) struct Inner {
    pub(crate) family: ApiFamily,
    pub(crate) executor: Arc<HttpExecutor>,
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) gate: Arc<CooldownGate>,
    pub(crate) registry: Arc<InflightRegistry<Outcome>>,
    pub(crate) counters: Arc<AtomicCounters>,
    pub(crate) disposed: AtomicBool,
}

/// Caching client for one API family.
///
/// Reads go through the cache, the in-flight registry and the cooldown gate; writes go straight
/// to the network and invalidate what they may have changed. Clones share one engine.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<Inner>,
}

impl CacheClient {
    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn family(&self) -> &ApiFamily {
        &self.inner.family
    }

    fn ensure_live(&self, endpoint: &str) -> Result<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(Error::runtime(
                "client disposed",
                ErrorContext::new().with_endpoint(endpoint).with_source("client"),
            ));
        }
        Ok(())
    }

    /// Cached GET, decoded into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&Params>,
        options: &RequestOptions,
    ) -> Result<T> {
        let value = self.get_value(endpoint, params, options).await?;
        decode(&value, endpoint)
    }

    /// Cached GET returning the shared JSON value. Repeated hits return the same allocation.
    pub async fn get_value(
        &self,
        endpoint: &str,
        params: Option<&Params>,
        options: &RequestOptions,
    ) -> Result<Arc<Value>> {
        self.ensure_live(endpoint)?;
        let inner = &self.inner;
        let key = build_key(endpoint, params, &options.tenant);
        let ttl = options.ttl.unwrap_or_else(|| inner.family.default_ttl());

        if !options.force_refresh {
            match inner.cache.lookup(&key, options.ttl) {
                Lookup::Fresh(value) => return Ok(value),
                Lookup::Stale(value) if inner.family.stale_while_revalidate => {
                    self.revalidate(&key, endpoint, params, ttl);
                    return Ok(value);
                }
                Lookup::Stale(_) | Lookup::Miss => {}
            }
        }

        match self.dispatch(&key, endpoint, params, ttl) {
            Some(Slot::Joined(request)) => self.join(request, &key).await,
            Some(Slot::Created(request)) => self.settle(request.await, &key),
            None => {
                if let Some(value) = inner.cache.fallback(&key) {
                    AtomicCounters::bump(&inner.counters.stale_fallbacks);
                    debug!(endpoint, cache_key = %key.digest(), "cooldown active, serving cached value");
                    return Ok(value);
                }
                AtomicCounters::bump(&inner.counters.cooldown_rejections);
                warn!(endpoint, cache_key = %key.digest(), "cooldown active and nothing to serve");
                Err(Error::CooldownRejected {
                    key: key.to_string(),
                })
            }
        }
    }

    async fn join(&self, request: SharedRequest<Outcome>, key: &CacheKey) -> Result<Arc<Value>> {
        AtomicCounters::bump(&self.inner.counters.joins);
        debug!(endpoint = key.endpoint(), cache_key = %key.digest(), "joining pending request");
        self.settle(request.await, key)
    }

    /// Serve a stale entry in place of an upstream failure when the family allows it.
    fn settle(&self, outcome: Outcome, key: &CacheKey) -> Result<Arc<Value>> {
        let inner = &self.inner;
        match outcome {
            Err(e) if e.is_upstream_failure() && inner.family.stale_on_error => {
                match inner.cache.fallback(key) {
                    Some(value) => {
                        AtomicCounters::bump(&inner.counters.stale_fallbacks);
                        warn!(endpoint = key.endpoint(), error = %e, "upstream failed, serving stale value");
                        Ok(value)
                    }
                    None => Err(e),
                }
            }
            other => other,
        }
    }

    /// Join the request pending for `key`, or register a new dispatch unless the key is cooling
    /// down (`None`). Both checks happen under the registry lock. The request runs on its own
    /// task: callers that stop waiting do not cancel it.
    fn dispatch(
        &self,
        key: &CacheKey,
        endpoint: &str,
        params: Option<&Params>,
        ttl: Duration,
    ) -> Option<Slot<Outcome>> {
        let inner = &self.inner;
        let admit = || !inner.gate.is_in_cooldown(key);
        inner.registry.get_or_create_if(key, admit, |pending| {
            let mut cooldown = inner.gate.arm(key);
            AtomicCounters::bump(&inner.counters.dispatches);
            let executor = Arc::clone(&inner.executor);
            let cache = Arc::clone(&inner.cache);
            let endpoint = endpoint.to_string();
            let params = params.cloned();

            let task = tokio::spawn(async move {
                let result = executor
                    .execute(Method::Get, &endpoint, params.as_ref(), None)
                    .await
                    .map(Arc::new);
                match &result {
                    Ok(value) => {
                        let written = pending
                            .if_current(|| cache.set(pending.key(), Arc::clone(value), ttl));
                        if written.is_none() {
                            debug!(endpoint = %endpoint, "response arrived after invalidation, not cached");
                        }
                    }
                    Err(e) => {
                        debug!(endpoint = %endpoint, error = %e, "dispatch failed");
                        cooldown.mark_failed();
                    }
                }
                drop(cooldown);
                drop(pending);
                result
            });

            let failed_endpoint = key.endpoint().to_string();
            async move {
                task.await.unwrap_or_else(|e| {
                    Err(Error::runtime(
                        format!("request task failed: {}", e),
                        ErrorContext::new()
                            .with_endpoint(failed_endpoint)
                            .with_source("client"),
                    ))
                })
            }
            .boxed()
        })
    }

    fn revalidate(&self, key: &CacheKey, endpoint: &str, params: Option<&Params>, ttl: Duration) {
        if let Some(Slot::Created(_)) = self.dispatch(key, endpoint, params, ttl) {
            AtomicCounters::bump(&self.inner.counters.background_refreshes);
            debug!(endpoint, cache_key = %key.digest(), "serving stale value, refreshing in background");
        }
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        scope: Option<&TenantContext>,
    ) -> Result<T> {
        self.mutate(Method::Post, endpoint, body, scope).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        scope: Option<&TenantContext>,
    ) -> Result<T> {
        self.mutate(Method::Put, endpoint, body, scope).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        scope: Option<&TenantContext>,
    ) -> Result<T> {
        self.mutate(Method::Patch, endpoint, body, scope).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        scope: Option<&TenantContext>,
    ) -> Result<T> {
        self.mutate(Method::Delete, endpoint, body, scope).await
    }

    /// Send a write, then invalidate the reads it may have changed. Failed writes invalidate
    /// nothing.
    async fn mutate<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        scope: Option<&TenantContext>,
    ) -> Result<T> {
        self.ensure_live(endpoint)?;
        AtomicCounters::bump(&self.inner.counters.mutations);
        let value = self
            .inner
            .executor
            .execute(method, endpoint, None, body)
            .await?;

        let family = &self.inner.family;
        let targets = family.invalidation_targets(endpoint);
        let written_family = endpoint_family(endpoint);
        let removed = self.invalidate_matching(&|key: &CacheKey| {
            let endpoint_match = match &targets {
                Some(targets) => {
                    key.family() == written_family
                        || targets.iter().any(|t| under_prefix(key.endpoint(), t))
                }
                None => scope.is_some() || key.family() == written_family,
            };
            endpoint_match && scope.map_or(true, |s| key.scope().within(s))
        });
        debug!(method = %method, endpoint, invalidated = removed, "write invalidated cached reads");

        decode(&value, endpoint)
    }

    fn invalidate_matching(&self, pred: &dyn Fn(&CacheKey) -> bool) -> usize {
        let inner = &self.inner;
        // Detach first: a pending read must not write back once its entry is gone.
        inner.registry.detach_where(pred);
        inner.gate.clear_where(pred);
        inner.cache.invalidate_where(pred)
    }

    /// Drop cached reads under `prefix` (segment-aware, `"/"` for all) whose tenant context lies
    /// within `scope`. Returns how many entries were removed.
    pub fn invalidate(&self, prefix: &str, scope: Option<&TenantContext>) -> usize {
        self.invalidate_matching(&|key: &CacheKey| {
            under_prefix(key.endpoint(), prefix) && scope.map_or(true, |s| key.scope().within(s))
        })
    }

    /// Whether any entry, fresh or stale, is cached for the request.
    pub fn has_cache(&self, endpoint: &str, params: Option<&Params>, tenant: &TenantContext) -> bool {
        self.inner.cache.has(&build_key(endpoint, params, tenant))
    }

    /// Fresh cached value, if any. Never touches the network.
    pub fn get_cached_only<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&Params>,
        tenant: &TenantContext,
    ) -> Result<Option<T>> {
        let key = build_key(endpoint, params, tenant);
        match self.inner.cache.get(&key, ReadOptions::fresh()) {
            Some(value) => decode(&value, endpoint).map(Some),
            None => Ok(None),
        }
    }

    /// Warm the cache. Failures are logged and otherwise ignored.
    pub async fn preload(&self, endpoint: &str, params: Option<&Params>, options: &RequestOptions) {
        if let Err(e) = self.get_value(endpoint, params, options).await {
            debug!(endpoint, error = %e, "preload failed");
        }
    }

    /// Forget pending requests and cooldown marks (logout, tenant switch). Requests already
    /// running still answer their callers but no longer populate the cache.
    pub fn clear_pending_requests(&self) {
        let detached = self.inner.registry.clear();
        self.inner.gate.clear();
        debug!(detached, "pending requests cleared");
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner.gate.clear();
    }

    /// Release every map. Later calls fail with a runtime error.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.registry.clear();
        self.inner.gate.clear();
        self.inner.cache.clear();
        debug!(family = %self.inner.family.name, "client disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SignalsSnapshot {
        let inner = &self.inner;
        SignalsSnapshot {
            family: inner.family.name.clone(),
            transport: inner.executor.transport_name(),
            cache_backend: inner.cache.backend_name(),
            cache: inner.cache.stats(),
            cached_entries: inner.cache.len(),
            pending_requests: inner.registry.len(),
            cooldown: inner.gate.snapshot(),
            calls: inner.counters.snapshot(),
        }
    }
}

fn decode<T: DeserializeOwned>(value: &Value, endpoint: &str) -> Result<T> {
    T::deserialize(value).map_err(|e| {
        Error::decode(
            format!("response does not match the expected type: {}", e),
            ErrorContext::new().with_endpoint(endpoint).with_source("client"),
        )
    })
}

/// `"/homework/3"` is under `"/homework"`, `"/homeworks"` is not.
fn under_prefix(endpoint: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match endpoint.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}
