//! Computed Properties
//!
//! A computed property is a key bound to an evaluator instead of a stored
//! value. The evaluator receives the owning object, the key, and the value
//! being written (`None` for reads) and returns the property's current
//! value. Writable computed properties keep whatever backing state they need
//! themselves, usually in another key of the same object.
//!
//! # Caching
//!
//! A cacheable property keeps its last result in a [`CacheEntry`] until one
//! of its dependencies changes. Invalidation only flips the validity flag;
//! the evaluator does not run again until the next read.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::Object;
use crate::value::Value;

/// Evaluator signature: `(object, key, new_value) -> current_value`.
pub type Evaluator = dyn Fn(&Object, &str, Option<Value>) -> Value + Send + Sync;

/// Declaration of a computed property.
///
/// Immutable once attached to an object.
#[derive(Clone)]
pub struct PropertyDescriptor {
    evaluator: Arc<Evaluator>,
    dependencies: SmallVec<[Box<str>; 4]>,
    cacheable: bool,
}

impl PropertyDescriptor {
    /// Create a computed property from a full evaluator.
    pub fn new<F>(evaluator: F) -> Self
    where
        F: Fn(&Object, &str, Option<Value>) -> Value + Send + Sync + 'static,
    {
        Self {
            evaluator: Arc::new(evaluator),
            dependencies: SmallVec::new(),
            cacheable: false,
        }
    }

    /// Create a read-only computed property. Writes are ignored and the
    /// property reports its computed value back.
    pub fn getter<F, V>(getter: F) -> Self
    where
        F: Fn(&Object) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Self::new(move |object, _key, _value| getter(object).into())
    }

    /// Declare the keys or paths this property is computed from.
    ///
    /// Plain keys refer to the owning object. Paths (`owner.name`) are
    /// resolved against the owning object and watched through every segment.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(|d| Box::from(d.as_ref())));
        self
    }

    /// Keep the last computed value until a dependency changes.
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|d| &**d)
    }

    /// Dependencies naming a key of the owning object.
    pub(crate) fn local_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies().filter(|d| is_local_key(d))
    }

    /// Dependencies reaching through other objects.
    pub(crate) fn path_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies().filter(|d| !is_local_key(d))
    }

    pub(crate) fn evaluate(&self, object: &Object, key: &str, value: Option<Value>) -> Value {
        (self.evaluator)(object, key, value)
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("dependencies", &self.dependencies)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

pub(crate) fn is_local_key(key: &str) -> bool {
    !key.contains(&['.', '*'][..])
}

/// Last computed value of a cacheable property.
#[derive(Debug, Default, Clone)]
pub struct CacheEntry {
    value: Value,
    valid: bool,
    /// Bumped on every invalidation; a result computed across an
    /// invalidation is not stored.
    epoch: u64,
}

impl CacheEntry {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn value(&self) -> Option<&Value> {
        self.valid.then_some(&self.value)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Store a freshly computed value if nothing invalidated the entry
    /// since `epoch` was read.
    pub fn fill(&mut self, value: Value, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.value = value;
        self.valid = true;
        true
    }

    /// Returns false if the entry was already invalid.
    pub fn invalidate(&mut self) -> bool {
        self.epoch += 1;
        if !self.valid {
            return false;
        }
        self.valid = false;
        self.value = Value::Undefined;
        true
    }
}

/// What a key holds.
pub(crate) enum Slot {
    Stored(Value),
    Computed {
        descriptor: Arc<PropertyDescriptor>,
        cache: CacheEntry,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_split_into_local_and_paths() {
        let descriptor = PropertyDescriptor::getter(|_| 0)
            .depends_on(["first", "owner.name", "*items.count"]);

        assert_eq!(descriptor.local_dependencies().collect::<Vec<_>>(), vec!["first"]);
        assert_eq!(
            descriptor.path_dependencies().collect::<Vec<_>>(),
            vec!["owner.name", "*items.count"]
        );
        assert!(!descriptor.is_cacheable());
    }

    #[test]
    fn cache_entry_invalidation_is_idempotent() {
        let mut cache = CacheEntry::default();
        assert!(!cache.invalidate());

        let epoch = cache.epoch();
        assert!(cache.fill(Value::Int(1), epoch));
        assert_eq!(cache.value(), Some(&Value::Int(1)));

        assert!(cache.invalidate());
        assert!(!cache.invalidate());
        assert!(cache.value().is_none());
    }

    #[test]
    fn stale_fill_is_dropped() {
        let mut cache = CacheEntry::default();
        let epoch = cache.epoch();
        cache.invalidate();

        assert!(!cache.fill(Value::Int(1), epoch));
        assert!(!cache.is_valid());
    }
}
