//! Ordered subscriber registry shared by the sync engine and the push channel
//!
//! Dispatch iterates over a snapshot of the registered callbacks taken when
//! the dispatch starts, so a callback may add or remove subscribers (itself
//! included) without corrupting the iteration. A callback that panics is
//! caught and logged; delivery continues with the next subscriber.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

/// Ids are unique per process so a stale handle can never match a
/// callback registered later in a fresh registry.
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

struct Registry<F: ?Sized> {
    entries: Vec<(SubscriberId, Arc<F>)>,
}

/// Ordered set of callbacks supporting add/remove/iterate during dispatch.
///
/// Cloning yields another handle to the same registry.
pub struct Subscribers<F: ?Sized> {
    inner: Arc<Mutex<Registry<F>>>,
}

impl<F: ?Sized> Clone for Subscribers<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ?Sized> Default for Subscribers<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> Subscribers<F> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback at the end of the dispatch order.
    pub fn insert(&self, callback: Arc<F>) -> SubscriberId {
        let id = SubscriberId::next();
        self.inner.lock().entries.push((id, callback));
        id
    }

    /// Remove exactly one callback. Returns `false` if it was already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut registry = self.inner.lock();
        let before = registry.entries.len();
        registry.entries.retain(|(entry_id, _)| *entry_id != id);
        registry.entries.len() != before
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.lock().entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    /// Callbacks in registration order, detached from the registry lock.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }

    /// Invoke every callback registered at the start of the call, in order.
    ///
    /// Returns how many callbacks panicked.
    pub fn dispatch(&self, mut invoke: impl FnMut(&F)) -> usize {
        let mut failed = 0;
        for callback in self.snapshot() {
            if !invoke_guarded(|| invoke(&*callback)) {
                failed += 1;
            }
        }
        failed
    }

    fn downgrade(&self) -> Weak<Mutex<Registry<F>>> {
        Arc::downgrade(&self.inner)
    }
}

impl<F: ?Sized + Send + Sync + 'static> Subscribers<F> {
    /// Register a callback and return its unsubscribe handle.
    pub fn subscribe(&self, callback: Arc<F>) -> Unsubscribe {
        let id = self.insert(callback);
        let registry = self.downgrade();
        Unsubscribe::new(id, move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }
}

/// Run a user callback, containing any panic it raises.
///
/// Returns `false` if the callback panicked.
pub(crate) fn invoke_guarded(callback: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(_) => {
            warn!("Callback panicked; continuing");
            false
        }
    }
}

/// Handle returned by every subscribe operation.
///
/// Calling [`Unsubscribe::unsubscribe`] removes exactly the callback it was
/// created for. It is idempotent, and never calling it is fine: dropping the
/// handle leaves the subscription in place.
#[derive(Clone)]
pub struct Unsubscribe {
    id: SubscriberId,
    detach: Arc<dyn Fn() + Send + Sync>,
}

impl Unsubscribe {
    pub(crate) fn new(id: SubscriberId, detach: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            id,
            detach: Arc::new(detach),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn unsubscribe(&self) {
        (self.detach)();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}
