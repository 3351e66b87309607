//! Observable Objects
//!
//! An [`Object`] is a key-value container. Each key holds either a stored
//! value or a computed property, and any key can have observers attached.
//!
//! # Change Notification
//!
//! Writing a different value to a key notifies that key. Notification:
//!
//! 1. Invalidates the cache of the key (if computed) and of every computed
//!    key that depends on it, transitively.
//! 2. Runs the observers of the key, then the observers of each dependent
//!    key, synchronously and in registration order.
//!
//! Between `begin_property_changes` and the matching
//! `end_property_changes`, step 2 is postponed. Each key changed inside the
//! bracket is dispatched once when the outermost bracket closes, however
//! many times it changed.
//!
//! # Locking
//!
//! State sits behind a mutex that is never held while user code runs.
//! Evaluators, observers and setters may therefore read and write any
//! object, including the one that called them.

mod builder;
mod observer;
mod property;

pub use builder::ObjectBuilder;
pub use observer::{Observer, ObserverFn, ObserverId};
pub use property::{CacheEntry, Evaluator, PropertyDescriptor};

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use self::observer::ObserverRegistry;
use self::property::Slot;
use crate::context::{DispatchContext, EvaluationContext};
use crate::error::{Error, Result};
use crate::graph::KeyGraph;
use crate::path::{resolve, PathObserver, PropertyPath};
use crate::value::Value;

/// Unique identifier for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// A key-value container with computed properties and observers.
///
/// Cloning the handle shares the object; equality of handles is identity.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

/// Non-owning handle to an object.
#[derive(Clone, Default)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

struct ObjectInner {
    id: ObjectId,
    state: Mutex<ObjectState>,
}

#[derive(Default)]
struct ObjectState {
    slots: IndexMap<Box<str>, Slot>,
    graph: KeyGraph,
    observers: ObserverRegistry,

    /// Open `begin_property_changes` brackets.
    pending_changes: usize,

    /// Keys changed while a bracket was open, in first-change order.
    changed: IndexSet<Box<str>>,

    /// Bumped on every change notification.
    revision: u64,

    /// Path observers feeding computed properties, by computed key.
    dependency_watchers: IndexMap<Box<str>, Vec<PathObserver>>,

    /// Path observers declared through the builder.
    declared_watchers: Vec<PathObserver>,
}

enum Write {
    Computed(Arc<PropertyDescriptor>, Value),
    Changed,
    Unchanged,
}

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: ObjectId::new(),
                state: Mutex::new(ObjectState::default()),
            }),
        }
    }

    /// Declare values, computed properties and observers up front.
    pub fn builder() -> ObjectBuilder {
        ObjectBuilder::new()
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Check whether two handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Read a property. Unknown keys read as `Undefined`.
    ///
    /// A computed property caught in a dependency cycle is logged and also
    /// reads as `Undefined`; use [`Object::try_get`] to see the error.
    pub fn get(&self, key: &str) -> Value {
        match self.try_get(key) {
            Ok(value) => value,
            Err(err) => {
                error!(object = ?self.id(), key, error = %err, "property evaluation failed");
                Value::Undefined
            }
        }
    }

    /// Read a property, surfacing evaluation cycles.
    pub fn try_get(&self, key: &str) -> Result<Value> {
        let (descriptor, epoch) = {
            let state = self.inner.state.lock();
            match state.slots.get(key) {
                None => return Ok(Value::Undefined),
                Some(Slot::Stored(value)) => return Ok(value.clone()),
                Some(Slot::Computed { descriptor, cache }) => {
                    if descriptor.is_cacheable() {
                        if let Some(value) = cache.value() {
                            return Ok(value.clone());
                        }
                    }
                    (descriptor.clone(), cache.epoch())
                }
            }
        };

        let ctx = EvaluationContext::enter(self.id(), key).ok_or_else(|| Error::DependencyCycle {
            key: key.to_string(),
        })?;

        trace!(object = ?self.id(), key, "evaluating computed property");
        let value = descriptor.evaluate(self, key, None);
        if ctx.is_cyclic() {
            return Err(Error::DependencyCycle { key: key.to_string() });
        }
        drop(ctx);

        if descriptor.is_cacheable() {
            let mut state = self.inner.state.lock();
            if let Some(Slot::Computed { descriptor: current, cache }) = state.slots.get_mut(key) {
                if Arc::ptr_eq(current, &descriptor) {
                    cache.fill(value.clone(), epoch);
                }
            }
        }

        Ok(value)
    }

    /// Write a property.
    ///
    /// Stored keys are replaced and notified only when the value differs.
    /// Computed keys pass the value to their evaluator; they are notified
    /// unless the evaluator reports the value the key read before the write.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();

        let write = {
            let mut state = self.inner.state.lock();
            match state.slots.get_mut(key) {
                Some(Slot::Computed { descriptor, .. }) => Write::Computed(descriptor.clone(), value),
                Some(Slot::Stored(current)) => {
                    if *current == value {
                        Write::Unchanged
                    } else {
                        *current = value;
                        Write::Changed
                    }
                }
                None if value.is_undefined() => Write::Unchanged,
                None => {
                    state.slots.insert(key.into(), Slot::Stored(value));
                    Write::Changed
                }
            }
        };

        match write {
            Write::Unchanged => trace!(object = ?self.id(), key, "set to current value"),
            Write::Changed => self.notify_property_change(key),
            Write::Computed(descriptor, value) => self.set_computed(key, &descriptor, value),
        }
    }

    fn set_computed(&self, key: &str, descriptor: &PropertyDescriptor, value: Value) {
        let previous = self.try_get(key).ok();

        // Writes the evaluator makes to backing keys are dispatched together
        // with `key`, once each.
        self.begin_property_changes();
        let result = descriptor.evaluate(self, key, Some(value));

        if let Some(Slot::Computed { cache, .. }) = self.inner.state.lock().slots.get_mut(key) {
            cache.invalidate();
        }

        if previous.as_ref() == Some(&result) {
            trace!(object = ?self.id(), key, "computed property kept its value");
        } else {
            self.notify_property_change(key);
        }
        self.end_property_changes();
    }

    /// Read a path relative to this object.
    pub fn get_path(&self, path: &str) -> Result<Value> {
        let path = PropertyPath::relative(path)?;
        resolve::get(&path, None, Some(self))
    }

    /// Write a path relative to this object.
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let path = PropertyPath::relative(path)?;
        resolve::set(&path, None, Some(self), value.into())
    }

    /// Set several keys inside one change bracket.
    pub fn set_properties<I, K, V>(&self, properties: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.begin_property_changes();
        for (key, value) in properties {
            self.set(key.as_ref(), value);
        }
        self.end_property_changes();
    }

    /// Add `delta` to a numeric property. Missing keys count as zero.
    pub fn increment_property(&self, key: &str, delta: i64) -> Value {
        let next = match self.get(key) {
            Value::Undefined | Value::Null => Value::Int(delta),
            Value::Int(n) => Value::Int(n.saturating_add(delta)),
            Value::Float(n) => Value::Float(n + delta as f64),
            other => {
                warn!(object = ?self.id(), key, value = ?other, "cannot increment non-numeric property");
                return other;
            }
        };
        self.set(key, next.clone());
        next
    }

    /// Flip a property's truthiness, storing a boolean.
    pub fn toggle_property(&self, key: &str) -> bool {
        let next = !self.get(key).is_truthy();
        self.set(key, next);
        next
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .slots
            .keys()
            .map(|key| key.to_string())
            .collect()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.inner.state.lock().slots.contains_key(key)
    }

    pub fn is_computed(&self, key: &str) -> bool {
        matches!(
            self.inner.state.lock().slots.get(key),
            Some(Slot::Computed { .. })
        )
    }

    /// Cache state of a computed key.
    pub fn cache_entry(&self, key: &str) -> Option<CacheEntry> {
        match self.inner.state.lock().slots.get(key) {
            Some(Slot::Computed { cache, .. }) => Some(cache.clone()),
            _ => None,
        }
    }

    /// Change generation, bumped by every notification.
    pub fn revision(&self) -> u64 {
        self.inner.state.lock().revision
    }

    /// Snapshot all properties as JSON, evaluating computed ones.
    pub fn snapshot(&self) -> serde_json::Value {
        let mut visiting = SmallVec::new();
        self.snapshot_inner(&mut visiting)
    }

    pub(crate) fn snapshot_inner(&self, visiting: &mut SmallVec<[ObjectId; 8]>) -> serde_json::Value {
        if visiting.contains(&self.id()) {
            return serde_json::Value::Null;
        }
        visiting.push(self.id());

        let mut map = serde_json::Map::new();
        for key in self.keys() {
            let value = self.get(&key).to_json_inner(visiting);
            map.insert(key, value);
        }

        visiting.pop();
        serde_json::Value::Object(map)
    }

    /// Store a value without notifying anyone. Used while hydrating.
    pub(crate) fn insert_stored(&self, key: &str, value: Value) {
        self.inner
            .state
            .lock()
            .slots
            .insert(key.into(), Slot::Stored(value));
    }

    // ------------------------------------------------------------------
    // Computed properties
    // ------------------------------------------------------------------

    /// Bind `key` to a computed property, replacing whatever it held.
    ///
    /// Fails with [`Error::DependencyCycle`] if the property would depend
    /// on itself through this object's keys.
    pub fn define_property(&self, key: &str, descriptor: PropertyDescriptor) -> Result<()> {
        let paths = descriptor
            .path_dependencies()
            .map(|path| PropertyPath::relative(path).map(PropertyPath::observe_all))
            .collect::<Result<Vec<_>>>()?;
        let descriptor = Arc::new(descriptor);

        let replaced = {
            let mut state = self.inner.state.lock();
            for path in &paths {
                let head = path.first_segment();
                if head == key || state.graph.depends_on(head, key) {
                    return Err(Error::DependencyCycle { key: key.to_string() });
                }
            }
            state.graph.declare(key, descriptor.local_dependencies())?;

            let had_value = state.slots.contains_key(key);
            state.slots.insert(
                key.into(),
                Slot::Computed {
                    descriptor: descriptor.clone(),
                    cache: CacheEntry::default(),
                },
            );
            (had_value, state.dependency_watchers.shift_remove(key))
        };
        let (had_value, stale_watchers) = replaced;
        drop(stale_watchers);

        let mut watchers = Vec::with_capacity(paths.len());
        for path in &paths {
            let owner = self.downgrade();
            let target: Box<str> = key.into();
            watchers.push(PathObserver::watch_from(self, path, move |_| {
                if let Some(owner) = owner.upgrade() {
                    owner.dependency_changed(&target);
                }
            })?);
        }
        if !watchers.is_empty() {
            self.inner
                .state
                .lock()
                .dependency_watchers
                .insert(key.into(), watchers);
        }

        debug!(
            object = ?self.id(),
            key,
            dependencies = ?descriptor.dependencies().collect::<Vec<_>>(),
            cacheable = descriptor.is_cacheable(),
            "computed property defined"
        );

        if had_value {
            self.notify_property_change(key);
        }
        Ok(())
    }

    pub(crate) fn adopt_watcher(&self, watcher: PathObserver) {
        self.inner.state.lock().declared_watchers.push(watcher);
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register `observer` for `key`. Registering the same observer twice
    /// for one key has no further effect.
    pub fn add_observer(&self, key: &str, observer: Observer) -> ObserverId {
        let id = observer.id();
        let added = self.inner.state.lock().observers.add(key, observer);
        trace!(object = ?self.id(), key, observer = ?id, added, "observer registered");
        id
    }

    /// Register a callback for `key`.
    pub fn observe<F>(&self, key: &str, callback: F) -> ObserverId
    where
        F: Fn(&Object, &str) + Send + Sync + 'static,
    {
        self.add_observer(key, Observer::new(callback))
    }

    /// Remove an observer. Takes effect immediately, including for a
    /// dispatch already in progress.
    pub fn remove_observer(&self, key: &str, id: ObserverId) -> bool {
        let removed = self.inner.state.lock().observers.remove(key, id);
        trace!(object = ?self.id(), key, observer = ?id, removed, "observer removed");
        removed
    }

    pub fn has_observer(&self, key: &str, id: ObserverId) -> bool {
        self.inner.state.lock().observers.contains(key, id)
    }

    pub fn observer_count(&self, key: &str) -> usize {
        self.inner.state.lock().observers.count(key)
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    /// Announce that `key` changed.
    pub fn notify_property_change(&self, key: &str) {
        let keys = {
            let mut state = self.inner.state.lock();
            let keys = invalidate_from(&mut state, key);

            if state.pending_changes > 0 {
                trace!(object = ?self.id(), key, "change deferred");
                state.changed.extend(keys);
                return;
            }
            keys
        };

        self.dispatch(&keys);
    }

    /// A path dependency of the computed `key` changed.
    ///
    /// If `key` is still being dispatched on this thread, the change came
    /// back around a cycle of computed properties. The caches are
    /// invalidated again but nothing is dispatched.
    fn dependency_changed(&self, key: &str) {
        if DispatchContext::is_dispatching(self.id(), key) {
            let err = Error::DependencyCycle { key: key.to_string() };
            error!(object = ?self.id(), key, error = %err, "dependency change re-entered its own dispatch");
            invalidate_from(&mut self.inner.state.lock(), key);
            return;
        }
        self.notify_property_change(key);
    }

    /// Open a change bracket. Brackets nest.
    pub fn begin_property_changes(&self) {
        self.inner.state.lock().pending_changes += 1;
    }

    /// Close a change bracket. Closing the outermost one dispatches every
    /// key changed inside it, once each.
    pub fn end_property_changes(&self) {
        let keys: Vec<Box<str>> = {
            let mut state = self.inner.state.lock();
            match state.pending_changes {
                0 => {
                    warn!(object = ?self.id(), "end_property_changes without matching begin");
                    return;
                }
                1 => {
                    state.pending_changes = 0;
                    state.changed.drain(..).collect()
                }
                _ => {
                    state.pending_changes -= 1;
                    return;
                }
            }
        };

        if !keys.is_empty() {
            debug!(object = ?self.id(), keys = keys.len(), "dispatching batched changes");
            self.dispatch(&keys);
        }
    }

    /// Run `f` inside a change bracket.
    pub fn property_changes<R>(&self, f: impl FnOnce(&Object) -> R) -> R {
        self.begin_property_changes();
        let result = f(self);
        self.end_property_changes();
        result
    }

    pub fn is_batching(&self) -> bool {
        self.inner.state.lock().pending_changes > 0
    }

    fn dispatch(&self, keys: &[Box<str>]) {
        for key in keys {
            let _dispatching = DispatchContext::enter(self.id(), key);
            let observers = self.inner.state.lock().observers.snapshot(key);
            for observer in observers {
                if !self.has_observer(key, observer.id()) {
                    continue;
                }
                trace!(object = ?self.id(), key = %key, observer = ?observer.id(), "notifying");
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.notify(self, key)));
                if let Err(payload) = outcome {
                    error!(
                        object = ?self.id(),
                        key = %key,
                        observer = ?observer.id(),
                        panic = %panic_message(payload.as_ref()),
                        "observer panicked"
                    );
                }
            }
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object").field("id", &self.id()).finish()
    }
}

impl WeakObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(object) => write!(f, "WeakObject({:?})", object.id()),
            None => f.write_str("WeakObject(<dropped>)"),
        }
    }
}

/// Record a change of `key`: bump the revision and invalidate the caches of
/// `key` and every computed key depending on it. Returns those keys,
/// dependencies first.
fn invalidate_from(state: &mut ObjectState, key: &str) -> SmallVec<[Box<str>; 4]> {
    state.revision += 1;

    let mut keys: SmallVec<[Box<str>; 4]> = SmallVec::new();
    keys.push(key.into());
    keys.extend(state.graph.affected_by(key));

    for changed in &keys {
        if let Some(Slot::Computed { cache, .. }) = state.slots.get_mut(&**changed) {
            cache.invalidate();
        }
    }
    keys
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
