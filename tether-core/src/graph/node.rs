//! Graph Nodes

use indexmap::IndexSet;

/// A key in an object's dependency graph.
#[derive(Debug, Default, Clone)]
pub struct KeyNode {
    /// Keys this key is computed from.
    dependencies: IndexSet<Box<str>>,

    /// Computed keys that read this key.
    dependents: IndexSet<Box<str>>,
}

impl KeyNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dependency(&mut self, key: &str) {
        self.dependencies.insert(key.into());
    }

    pub fn remove_dependency(&mut self, key: &str) {
        self.dependencies.shift_remove(key);
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|k| &**k)
    }

    pub fn add_dependent(&mut self, key: &str) {
        self.dependents.insert(key.into());
    }

    pub fn remove_dependent(&mut self, key: &str) {
        self.dependents.shift_remove(key);
    }

    pub fn dependents(&self) -> impl Iterator<Item = &str> {
        self.dependents.iter().map(|k| &**k)
    }

    pub fn has_dependents(&self) -> bool {
        !self.dependents.is_empty()
    }

    /// A node with no edges carries no information.
    pub fn is_isolated(&self) -> bool {
        self.dependencies.is_empty() && self.dependents.is_empty()
    }

    pub fn clear_dependencies(&mut self) {
        self.dependencies.clear();
    }
}
