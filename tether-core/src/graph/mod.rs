//! Key Dependency Graph
//!
//! Each container keeps a small graph of its own keys: an edge runs from a
//! key to every computed key declared as depending on it. The graph answers
//! two questions:
//!
//! - Which computed keys must be invalidated (and notified) when a key
//!   changes? Answered transitively, dependencies before dependents.
//! - Would declaring a new computed key close a cycle? Checked before the
//!   edges are inserted, so the graph is always a DAG.
//!
//! Dependencies that reach into other objects through paths are not edges
//! here; those are watched by path observers and caught at evaluation time.

mod node;
mod keys;

pub use node::KeyNode;
pub use keys::KeyGraph;
