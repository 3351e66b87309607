//! Object Builder
//!
//! Declares an object's initial values, computed properties and observers
//! in one place. `build` attaches them in that order, so computed
//! properties see the initial values and observers never fire for them.

use smallvec::SmallVec;

use super::property::is_local_key;
use super::{Object, Observer, PropertyDescriptor};
use crate::error::Result;
use crate::path::{PathObserver, PropertyPath};
use crate::value::Value;

/// Builder for [`Object`].
#[derive(Default)]
pub struct ObjectBuilder {
    values: Vec<(Box<str>, Value)>,
    properties: Vec<(Box<str>, PropertyDescriptor)>,
    observers: Vec<(SmallVec<[Box<str>; 2]>, Observer)>,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial stored value.
    pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// Computed property.
    pub fn computed(mut self, key: &str, descriptor: PropertyDescriptor) -> Self {
        self.properties.push((key.into(), descriptor));
        self
    }

    /// Observer watching one or more keys or paths.
    ///
    /// Paths are resolved against the built object and watched through
    /// every segment. The callback receives the object and the key or path
    /// string that changed.
    pub fn observer<I, S, F>(mut self, keys: I, callback: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&Object, &str) + Send + Sync + 'static,
    {
        let keys = keys.into_iter().map(|k| Box::from(k.as_ref())).collect();
        self.observers.push((keys, Observer::new(callback)));
        self
    }

    /// Create the object.
    pub fn build(self) -> Result<Object> {
        let object = Object::new();

        for (key, value) in self.values {
            object.insert_stored(&key, value);
        }

        for (key, descriptor) in self.properties {
            object.define_property(&key, descriptor)?;
        }

        for (keys, observer) in self.observers {
            for key in keys {
                if is_local_key(&key) {
                    object.add_observer(&key, observer.clone());
                    continue;
                }

                let path = PropertyPath::relative(&key)?.observe_all();
                let owner = object.downgrade();
                let observer = observer.clone();
                let watcher = PathObserver::watch_from(&object, &path, move |_| {
                    if let Some(owner) = owner.upgrade() {
                        observer.notify(&owner, &key);
                    }
                })?;
                object.adopt_watcher(watcher);
            }
        }

        Ok(object)
    }
}
