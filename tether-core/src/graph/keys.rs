//! Key Graph
//!
//! Change propagation walks dependents breadth-first, then orders the
//! affected keys with Kahn's algorithm so a computed key always comes after
//! every affected key it reads from.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use super::node::KeyNode;
use crate::error::{Error, Result};

/// Dependency graph over one object's keys.
#[derive(Debug, Default)]
pub struct KeyGraph {
    nodes: IndexMap<Box<str>, KeyNode>,
}

impl KeyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `key` as computed from `dependencies`.
    ///
    /// Replaces any previous declaration of `key`. Fails without touching
    /// the graph if the new edges would close a cycle.
    pub fn declare<'a, I>(&mut self, key: &str, dependencies: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let dependencies: IndexSet<&str> = dependencies.into_iter().collect();

        for dependency in &dependencies {
            if *dependency == key || self.depends_on(dependency, key) {
                return Err(Error::DependencyCycle { key: key.to_string() });
            }
        }

        self.retract(key);

        for dependency in dependencies {
            self.node_mut(dependency).add_dependent(key);
            self.node_mut(key).add_dependency(dependency);
        }
        Ok(())
    }

    /// Remove the dependencies of `key`. Keys that still depend on `key`
    /// keep their edges.
    pub fn retract(&mut self, key: &str) {
        let dependencies: Vec<Box<str>> = match self.nodes.get_mut(key) {
            Some(node) => {
                let deps = node.dependencies().map(Into::into).collect();
                node.clear_dependencies();
                deps
            }
            None => return,
        };

        for dependency in dependencies {
            if let Some(node) = self.nodes.get_mut(&*dependency) {
                node.remove_dependent(key);
            }
        }
        self.nodes.retain(|_, node| !node.is_isolated());
    }

    /// Check whether `key` reads `target`, directly or transitively.
    pub fn depends_on(&self, key: &str, target: &str) -> bool {
        let mut seen = IndexSet::new();
        let mut queue = VecDeque::from([key]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                for dependency in node.dependencies() {
                    if dependency == target {
                        return true;
                    }
                    queue.push_back(dependency);
                }
            }
        }
        false
    }

    /// Direct dependencies declared for `key`.
    pub fn dependencies_of(&self, key: &str) -> Vec<&str> {
        self.nodes
            .get(key)
            .map(|node| node.dependencies().collect())
            .unwrap_or_default()
    }

    /// Every computed key affected by a change to `key`, ordered so that
    /// dependencies precede dependents. `key` itself is not included.
    pub fn affected_by(&self, key: &str) -> Vec<Box<str>> {
        let has_dependents = self
            .nodes
            .get(key)
            .map(KeyNode::has_dependents)
            .unwrap_or(false);
        if !has_dependents {
            return Vec::new();
        }

        let mut affected: IndexSet<&str> = IndexSet::new();
        let mut queue: VecDeque<&str> = self
            .nodes
            .get(key)
            .map(|node| node.dependents().collect())
            .unwrap_or_default();

        while let Some(current) = queue.pop_front() {
            if !affected.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                queue.extend(node.dependents());
            }
        }

        self.topological_order(&affected)
    }

    /// Order `keys` with Kahn's algorithm, counting only edges inside the set.
    fn topological_order(&self, keys: &IndexSet<&str>) -> Vec<Box<str>> {
        let mut in_degree: IndexMap<&str, usize> = IndexMap::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::with_capacity(keys.len());

        for &key in keys {
            let degree = self
                .nodes
                .get(key)
                .map(|node| node.dependencies().filter(|d| keys.contains(d)).count())
                .unwrap_or(0);
            in_degree.insert(key, degree);
            if degree == 0 {
                queue.push_back(key);
            }
        }

        while let Some(key) = queue.pop_front() {
            result.push(Box::from(key));

            if let Some(node) = self.nodes.get(key) {
                for dependent in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        result
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node_mut(&mut self, key: &str) -> &mut KeyNode {
        self.nodes.entry(key.into()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(keys: Vec<Box<str>>) -> Vec<String> {
        keys.into_iter().map(String::from).collect()
    }

    #[test]
    fn affected_keys_follow_dependency_order() {
        let mut graph = KeyGraph::new();
        graph.declare("full", ["first", "last"]).unwrap();
        graph.declare("greeting", ["full", "title"]).unwrap();
        graph.declare("shout", ["greeting"]).unwrap();

        assert_eq!(names(graph.affected_by("first")), vec!["full", "greeting", "shout"]);
        assert_eq!(names(graph.affected_by("title")), vec!["greeting", "shout"]);
        assert!(graph.affected_by("shout").is_empty());
        assert!(graph.affected_by("unknown").is_empty());
    }

    #[test]
    fn diamond_is_ordered_once() {
        let mut graph = KeyGraph::new();
        graph.declare("b", ["a"]).unwrap();
        graph.declare("c", ["a"]).unwrap();
        graph.declare("d", ["b", "c"]).unwrap();

        assert_eq!(names(graph.affected_by("a")), vec!["b", "c", "d"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = KeyGraph::new();
        assert!(matches!(
            graph.declare("a", ["a"]),
            Err(Error::DependencyCycle { .. })
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn transitive_cycle_is_rejected_without_side_effects() {
        let mut graph = KeyGraph::new();
        graph.declare("b", ["a"]).unwrap();
        graph.declare("c", ["b"]).unwrap();

        assert!(graph.declare("a", ["c"]).is_err());
        assert!(graph.dependencies_of("a").is_empty());
        assert_eq!(names(graph.affected_by("a")), vec!["b", "c"]);
    }

    #[test]
    fn redeclaring_replaces_edges() {
        let mut graph = KeyGraph::new();
        graph.declare("full", ["first", "last"]).unwrap();
        graph.declare("full", ["nick"]).unwrap();

        assert!(graph.affected_by("first").is_empty());
        assert_eq!(names(graph.affected_by("nick")), vec!["full"]);
        assert_eq!(graph.dependencies_of("full"), vec!["nick"]);
    }

    #[test]
    fn retract_drops_isolated_nodes() {
        let mut graph = KeyGraph::new();
        graph.declare("full", ["first"]).unwrap();
        assert_eq!(graph.len(), 2);

        graph.retract("full");
        assert!(graph.is_empty());
    }
}
