use crate::cache::CacheKey;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A request future every interested caller can await.
pub type SharedRequest<T> = Shared<BoxFuture<'static, T>>;

struct Pending<T: Clone> {
    id: u64,
    request: SharedRequest<T>,
}

/// Result of [`InflightRegistry::get_or_create`].
pub enum Slot<T: Clone> {
    /// Another caller's request was already pending for the key.
    Joined(SharedRequest<T>),
    /// The factory ran and its request is now registered.
    Created(SharedRequest<T>),
}

impl<T: Clone> Slot<T> {
    pub fn into_request(self) -> SharedRequest<T> {
        match self {
            Slot::Joined(r) | Slot::Created(r) => r,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, Slot::Joined(_))
    }
}

/// At most one pending request per key.
///
/// Registration and factory invocation happen under one lock, so concurrent callers for the same
/// key always see each other. Removal is tied to a [`PendingGuard`] the factory must move into its
/// future: the entry goes away when that future finishes or is torn down. Run the real work on a
/// spawned task so teardown also happens on panic and when every caller stops waiting.
pub struct InflightRegistry<T: Clone> {
    pending: Mutex<HashMap<CacheKey, Pending<T>>>,
    next_id: AtomicU64,
}

impl<T> InflightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Pending<T>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the pending request for `key`, or run `factory` and register what it returns.
    pub fn get_or_create<F>(self: &Arc<Self>, key: &CacheKey, factory: F) -> Slot<T>
    where
        F: FnOnce(PendingGuard<T>) -> BoxFuture<'static, T>,
    {
        let mut pending = self.lock();
        match pending.get(key) {
            Some(p) => Slot::Joined(p.request.clone()),
            None => self.register(&mut pending, key, factory),
        }
    }

    /// Like [`get_or_create`](Self::get_or_create), but a new request is only registered when
    /// `admit` agrees. `admit` runs under the registry lock after the pending check, so nothing
    /// can register or settle in between. `None` when it refused.
    pub fn get_or_create_if<A, F>(
        self: &Arc<Self>,
        key: &CacheKey,
        admit: A,
        factory: F,
    ) -> Option<Slot<T>>
    where
        A: FnOnce() -> bool,
        F: FnOnce(PendingGuard<T>) -> BoxFuture<'static, T>,
    {
        let mut pending = self.lock();
        if let Some(p) = pending.get(key) {
            return Some(Slot::Joined(p.request.clone()));
        }
        if !admit() {
            return None;
        }
        Some(self.register(&mut pending, key, factory))
    }

    fn register<F>(
        self: &Arc<Self>,
        pending: &mut HashMap<CacheKey, Pending<T>>,
        key: &CacheKey,
        factory: F,
    ) -> Slot<T>
    where
        F: FnOnce(PendingGuard<T>) -> BoxFuture<'static, T>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = PendingGuard {
            registry: Arc::clone(self),
            key: key.clone(),
            id,
        };
        let request = factory(guard).shared();
        pending.insert(
            key.clone(),
            Pending {
                id,
                request: request.clone(),
            },
        );
        Slot::Created(request)
    }

    /// Run `f` only while the entry `id` is still the registered one for `key`.
    fn with_current<R>(&self, key: &CacheKey, id: u64, f: impl FnOnce() -> R) -> Option<R> {
        let pending = self.lock();
        if pending.get(key).map(|p| p.id) == Some(id) {
            Some(f())
        } else {
            None
        }
    }

    fn remove(&self, key: &CacheKey, id: u64) {
        let mut pending = self.lock();
        if pending.get(key).map(|p| p.id) == Some(id) {
            pending.remove(key);
        }
    }

    /// Forget matching entries. Their requests keep running for callers already waiting, but new
    /// callers no longer join them.
    pub fn detach_where(&self, pred: &dyn Fn(&CacheKey) -> bool) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|k, _| !pred(k));
        before - pending.len()
    }

    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        let n = pending.len();
        pending.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for InflightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Registration ticket of one pending request. Dropping it removes the entry, unless the entry
/// was detached and replaced in the meantime.
pub struct PendingGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    registry: Arc<InflightRegistry<T>>,
    key: CacheKey,
    id: u64,
}

impl<T> PendingGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Run `f` atomically with respect to detachment: `None` if this request was detached.
    pub fn if_current<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        self.registry.with_current(&self.key, self.id, f)
    }
}

impl<T> Drop for PendingGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.registry.remove(&self.key, self.id);
    }
}
