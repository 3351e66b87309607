//! Observer types for the property runtime.
//!
//! An Observer is a callback registered against one key of one object. The
//! object holds the observer only until it is explicitly removed; nothing
//! expires on its own.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::Object;

/// Unique identifier for an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked with the changed object and key.
pub type ObserverFn = dyn Fn(&Object, &str) + Send + Sync;

/// A change callback with a stable identity.
///
/// Cloning an observer keeps its ID, so the same observer can be added to
/// several keys and removed from each of them later.
#[derive(Clone)]
pub struct Observer {
    id: ObserverId,
    callback: Arc<ObserverFn>,
}

impl Observer {
    /// Create a new observer with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Object, &str) + Send + Sync + 'static,
    {
        Self::with_id(ObserverId::new(), callback)
    }

    /// Create an observer whose ID was allocated up front, so the callback
    /// can refer to its own registration.
    pub(crate) fn with_id<F>(id: ObserverId, callback: F) -> Self
    where
        F: Fn(&Object, &str) + Send + Sync + 'static,
    {
        Self {
            id,
            callback: Arc::new(callback),
        }
    }

    /// Get the observer's unique ID.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Invoke the callback.
    pub fn notify(&self, object: &Object, key: &str) {
        (self.callback)(object, key);
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").field("id", &self.id).finish()
    }
}

/// Per-object map from key to observers, in registration order.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    by_key: IndexMap<Box<str>, SmallVec<[Observer; 2]>>,
}

impl ObserverRegistry {
    /// Returns false if the observer was already registered for `key`.
    pub fn add(&mut self, key: &str, observer: Observer) -> bool {
        let observers = self.by_key.entry(key.into()).or_default();
        if observers.iter().any(|o| o.id == observer.id) {
            return false;
        }
        observers.push(observer);
        true
    }

    pub fn remove(&mut self, key: &str, id: ObserverId) -> bool {
        let Some(observers) = self.by_key.get_mut(key) else {
            return false;
        };
        let before = observers.len();
        observers.retain(|o| o.id != id);
        let removed = observers.len() != before;
        if observers.is_empty() {
            self.by_key.shift_remove(key);
        }
        removed
    }

    pub fn contains(&self, key: &str, id: ObserverId) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|observers| observers.iter().any(|o| o.id == id))
    }

    pub fn snapshot(&self, key: &str) -> SmallVec<[Observer; 2]> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    pub fn count(&self, key: &str) -> usize {
        self.by_key.get(key).map_or(0, SmallVec::len)
    }
}
