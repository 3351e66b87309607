//! Bindings
//!
//! A binding links two property paths so they hold the same value. Changes
//! are not copied immediately: a change marks the binding dirty and the
//! [`RunLoop`] applies every dirty binding when the host flushes it.
//!
//! - `spec`: the declaration (`BindingSpec`)
//! - `link`: a connected binding and its synchronization rules
//! - `run_loop`: the deferred queue and the flush point

mod link;
mod run_loop;
mod spec;

pub use link::{Binding, BindingId, SyncOutcome};
pub use run_loop::{FlushReport, RunLoop};
pub use spec::{BindingSpec, Direction, Transform};

pub(crate) use link::Endpoint;
