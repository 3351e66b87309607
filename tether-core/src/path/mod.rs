//! Property Paths
//!
//! Paths address properties of nested objects: `App.controller.title`
//! reads `title` from whatever `controller` the `App` root holds. This
//! module parses path strings, resolves them to `(object, key)` pairs, and
//! keeps observers attached to a path while the objects along it change.

mod namespace;
mod observer;
mod parse;
pub mod resolve;

pub use namespace::Namespace;
pub use observer::{PathCallback, PathObserver};
pub use parse::{Anchor, PropertyPath, CHAIN_MARKER, SEPARATOR};
