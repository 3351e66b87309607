//! Tether Core
//!
//! This crate provides an observable property runtime: key-value objects
//! whose properties can be computed from other properties, observed for
//! changes, and bound to properties of other objects.
//!
//! It implements:
//!
//! - A uniform get/set protocol over stored and computed properties
//! - Cached computed properties with dependency-driven invalidation
//! - Synchronous change observers with batched notification
//! - Property paths, including paths that follow replaced objects
//! - Bindings synchronized by a deferred run loop
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `object`: Observable objects, computed properties and observers
//! - `graph`: Per-object key dependency graph
//! - `path`: Path grammar, resolution and chained path observers
//! - `binding`: Bindings and the run loop that applies them
//! - `runtime`: Namespace, run loop and configuration in one handle
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::{Object, PropertyDescriptor, Runtime};
//!
//! let runtime = Runtime::new();
//!
//! let person = Object::builder()
//!     .value("first", "Ada")
//!     .value("last", "Lovelace")
//!     .computed(
//!         "full",
//!         PropertyDescriptor::getter(|p: &Object| {
//!             format!("{} {}", p.get("first").as_str().unwrap_or(""), p.get("last").as_str().unwrap_or(""))
//!         })
//!         .depends_on(["first", "last"])
//!         .cacheable(),
//!     )
//!     .build()?;
//! runtime.register("Person", &person);
//!
//! let label = Object::new();
//! runtime.bind(&label, "text", "Person.full")?;
//!
//! person.set("first", "Augusta");
//! runtime.flush();
//! // label.text == "Augusta Lovelace"
//! ```

pub mod binding;
pub mod context;
pub mod error;
pub mod graph;
pub mod object;
pub mod path;

mod config;
mod runtime;
mod value;

pub use binding::{Binding, BindingId, BindingSpec, Direction, FlushReport, RunLoop, SyncOutcome};
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use object::{Object, ObjectBuilder, ObjectId, Observer, ObserverId, PropertyDescriptor, WeakObject};
pub use path::{Namespace, PathObserver, PropertyPath};
pub use runtime::Runtime;
pub use value::Value;
