//! Root Namespace
//!
//! Absolute paths start at a named root. Roots live in an explicit
//! namespace handle rather than a process global, so independent runtimes
//! (and tests) never see each other's objects.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::object::Object;

/// Registry of named root objects.
///
/// Cloning the handle shares the registry.
#[derive(Clone, Default)]
pub struct Namespace {
    roots: Arc<DashMap<Box<str>, Object>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `object` under `name`, returning the object it replaced.
    ///
    /// Replacing a root is not observed by existing path observers; they
    /// resolved the root once when they were installed.
    pub fn register(&self, name: &str, object: Object) -> Option<Object> {
        debug!(root = name, object = ?object.id(), "root registered");
        self.roots.insert(name.into(), object)
    }

    pub fn unregister(&self, name: &str) -> Option<Object> {
        self.roots.remove(name).map(|(_, object)| object)
    }

    pub fn lookup(&self, name: &str) -> Option<Object> {
        self.roots.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let namespace = Namespace::new();
        let app = Object::new();

        assert!(namespace.register("App", app.clone()).is_none());
        assert!(namespace.lookup("App").unwrap().ptr_eq(&app));
        assert!(namespace.lookup("Other").is_none());

        let shared = namespace.clone();
        assert!(shared.contains("App"));

        assert!(namespace.unregister("App").is_some());
        assert!(shared.is_empty());
    }
}
