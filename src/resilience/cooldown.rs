use crate::cache::CacheKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum MarkState {
    /// Dispatched and not yet settled.
    Armed,
    /// Settled; blocks new dispatches until the deadline.
    Until(Instant),
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    id: u64,
    state: MarkState,
}

#[derive(Debug, Clone, Default)]
pub struct CooldownSnapshot {
    pub window_ms: u64,
    pub active: usize,
}

/// Per-key dispatch throttle.
///
/// - A mark is armed when a request is dispatched and blocks while it is in flight
/// - Settling converts it to a deadline `window` later
/// - Expired marks are dropped lazily on the next check
pub struct CooldownGate {
    window: Duration,
    marks: Mutex<HashMap<CacheKey, Mark>>,
    next_id: AtomicU64,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            marks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // Marks are single-field writes; a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Mark>> {
        self.marks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_cooldown(&self, key: &CacheKey) -> bool {
        let mut marks = self.lock();
        match marks.get(key).map(|m| m.state) {
            Some(MarkState::Armed) => true,
            Some(MarkState::Until(deadline)) if Instant::now() < deadline => true,
            Some(MarkState::Until(_)) => {
                marks.remove(key);
                false
            }
            None => false,
        }
    }

    /// Arm the mark for `key`, replacing any previous one. Returns the mark's id.
    pub fn mark_attempted(&self, key: &CacheKey) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            key.clone(),
            Mark {
                id,
                state: MarkState::Armed,
            },
        );
        id
    }

    /// Let the mark for `key` lapse `delay` from now.
    pub fn release_after(&self, key: &CacheKey, delay: Duration) {
        if let Some(mark) = self.lock().get_mut(key) {
            mark.state = MarkState::Until(Instant::now() + delay);
        }
    }

    fn settle(&self, key: &CacheKey, id: u64, delay: Option<Duration>) {
        let mut marks = self.lock();
        // The mark may have been cleared and re-armed by a newer dispatch.
        if marks.get(key).map(|m| m.id) != Some(id) {
            return;
        }
        match delay {
            Some(d) if !d.is_zero() => {
                if let Some(mark) = marks.get_mut(key) {
                    mark.state = MarkState::Until(Instant::now() + d);
                }
            }
            _ => {
                marks.remove(key);
            }
        }
    }

    /// Arm a mark that settles itself when the returned guard drops.
    pub fn arm(self: &Arc<Self>, key: &CacheKey) -> CooldownGuard {
        let id = self.mark_attempted(key);
        CooldownGuard {
            gate: Arc::clone(self),
            key: key.clone(),
            id,
            failed: false,
        }
    }

    pub fn clear_where(&self, pred: &dyn Fn(&CacheKey) -> bool) -> usize {
        let mut marks = self.lock();
        let before = marks.len();
        marks.retain(|k, _| !pred(k));
        before - marks.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn snapshot(&self) -> CooldownSnapshot {
        let now = Instant::now();
        let active = self
            .lock()
            .values()
            .filter(|m| match m.state {
                MarkState::Armed => true,
                MarkState::Until(deadline) => now < deadline,
            })
            .count();
        CooldownSnapshot {
            window_ms: self.window.as_millis() as u64,
            active,
        }
    }
}

/// Settles a dispatch's cooldown mark on drop: held for the window after a success, lifted
/// immediately after a failure so a retry is not throttled.
pub struct CooldownGuard {
    gate: Arc<CooldownGate>,
    key: CacheKey,
    id: u64,
    failed: bool,
}

impl CooldownGuard {
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for CooldownGuard {
    fn drop(&mut self) {
        let delay = if self.failed {
            None
        } else {
            Some(self.gate.window)
        };
        self.gate.settle(&self.key, self.id, delay);
    }
}
