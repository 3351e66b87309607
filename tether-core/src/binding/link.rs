//! Binding Implementation
//!
//! A binding keeps the values at two paths equal. Each side is watched by a
//! [`PathObserver`]; a change marks the binding dirty and queues it on the
//! run loop. Nothing is written until the run loop flushes.
//!
//! # Synchronization
//!
//! On flush the binding copies the side that changed onto the other one,
//! through the transform if there is one. The source wins when both sides
//! changed. Equal values are never written, which is what stops two
//! bindings from ping-ponging a value between them forever.
//!
//! Notifications caused by the binding's own write are ignored.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::run_loop::{RunLoop, WeakRunLoop};
use super::spec::{Direction, Transform};
use crate::error::{Error, Result};
use crate::object::Object;
use crate::path::{Namespace, PathObserver, PropertyPath};
use crate::value::Value;

/// Unique identifier for a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Result of synchronizing one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A value was written.
    Synced,
    /// Both sides already agreed.
    Unchanged,
}

/// One end of a binding: a path and the object relative paths start from.
pub(crate) struct Endpoint {
    pub path: PropertyPath,
    pub base: Option<Object>,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Source,
    Dest,
}

/// Handle to a connected binding.
///
/// The run loop owns the binding; dropping the handle does not disconnect
/// it.
#[derive(Clone)]
pub struct Binding {
    inner: Arc<BindingInner>,
}

pub(crate) struct BindingInner {
    id: BindingId,
    source: PathObserver,
    dest: PathObserver,
    one_way: bool,
    transform: Option<Arc<Transform>>,
    state: Mutex<BindingState>,
    run_loop: WeakRunLoop,
}

#[derive(Default)]
struct BindingState {
    connected: bool,
    /// Queued on the run loop.
    dirty: bool,
    source_changed: bool,
    dest_changed: bool,
    /// Set while the binding writes one of its own sides.
    writing: bool,
}

/// Clears `writing` when the write finishes, however it finishes.
struct Writing<'a>(&'a Mutex<BindingState>);

impl<'a> Writing<'a> {
    fn start(state: &'a Mutex<BindingState>) -> Self {
        state.lock().writing = true;
        Self(state)
    }
}

impl Drop for Writing<'_> {
    fn drop(&mut self) {
        self.0.lock().writing = false;
    }
}

type Slot = Arc<OnceLock<Weak<BindingInner>>>;

fn on_change(slot: &Slot, side: Side) -> impl Fn(&Value) + Send + Sync + 'static {
    let slot = slot.clone();
    move |_| {
        if let Some(binding) = slot.get().and_then(Weak::upgrade) {
            binding.side_changed(side);
        }
    }
}

impl Binding {
    /// Watch both endpoints, register with `run_loop` and queue the first
    /// synchronization.
    pub(crate) fn connect(
        run_loop: &RunLoop,
        namespace: Option<&Namespace>,
        source: Endpoint,
        dest: Endpoint,
        one_way: bool,
        transform: Option<Arc<Transform>>,
    ) -> Result<Self> {
        // The observers exist before the binding does; their callbacks find
        // it through this slot.
        let slot = Slot::default();

        let source_observer = PathObserver::watch(
            &source.path,
            namespace,
            source.base.as_ref(),
            on_change(&slot, Side::Source),
        )?;
        let dest_observer = if one_way {
            PathObserver::watch(&dest.path, namespace, dest.base.as_ref(), |_| {})?
        } else {
            PathObserver::watch(
                &dest.path,
                namespace,
                dest.base.as_ref(),
                on_change(&slot, Side::Dest),
            )?
        };

        let inner = Arc::new(BindingInner {
            id: BindingId::new(),
            source: source_observer,
            dest: dest_observer,
            one_way,
            transform,
            state: Mutex::new(BindingState {
                connected: true,
                ..BindingState::default()
            }),
            run_loop: run_loop.downgrade(),
        });
        // Fresh slot, nothing else can have filled it.
        let _ = slot.set(Arc::downgrade(&inner));

        run_loop.register(inner.clone());
        debug!(
            binding = ?inner.id,
            source = %source.path,
            dest = %dest.path,
            one_way,
            "binding connected"
        );

        inner.side_changed(Side::Source);
        Ok(Self { inner })
    }

    pub fn id(&self) -> BindingId {
        self.inner.id
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// True while a synchronization is queued.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    pub fn is_one_way(&self) -> bool {
        self.inner.one_way
    }

    pub fn source_path(&self) -> String {
        self.inner.source.path()
    }

    pub fn dest_path(&self) -> String {
        self.inner.dest.path()
    }

    /// Stop watching both sides and drop any queued synchronization.
    ///
    /// Returns `false` if the binding was already disconnected.
    pub fn disconnect(&self) -> bool {
        self.inner.disconnect()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source.path())
            .field("dest", &self.inner.dest.path())
            .field("one_way", &self.inner.one_way)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl BindingInner {
    pub(crate) fn id(&self) -> BindingId {
        self.id
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn side_changed(self: &Arc<Self>, side: Side) {
        let enqueue = {
            let mut state = self.state.lock();
            if !state.connected {
                return;
            }
            if state.writing {
                trace!(binding = ?self.id, ?side, "ignoring own write");
                return;
            }
            match side {
                Side::Source => state.source_changed = true,
                Side::Dest => state.dest_changed = true,
            }
            !mem::replace(&mut state.dirty, true)
        };

        if !enqueue {
            return;
        }
        match self.run_loop.upgrade() {
            Some(run_loop) => {
                run_loop.enqueue(self.clone());
            }
            None => trace!(binding = ?self.id, "run loop is gone, binding stays dirty"),
        }
    }

    /// Copy the changed side onto the other one.
    pub(crate) fn sync(&self) -> Result<SyncOutcome> {
        let (source_changed, dest_changed) = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(Error::Disconnected);
            }
            state.dirty = false;
            (
                mem::take(&mut state.source_changed),
                mem::take(&mut state.dest_changed),
            )
        };

        let direction = if self.one_way || source_changed || !dest_changed {
            Direction::Forward
        } else {
            Direction::Backward
        };
        let (from, to) = match direction {
            Direction::Forward => (&self.source, &self.dest),
            Direction::Backward => (&self.dest, &self.source),
        };

        let mut value = from.value();
        if let Some(transform) = &self.transform {
            value = transform(&value, direction);
        }

        if to.value() == value {
            trace!(binding = ?self.id, ?direction, "binding already in sync");
            return Ok(SyncOutcome::Unchanged);
        }

        let _writing = Writing::start(&self.state);
        to.set_value(value)?;
        trace!(binding = ?self.id, ?direction, "binding synced");
        Ok(SyncOutcome::Synced)
    }

    pub(crate) fn disconnect(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !state.connected {
                return false;
            }
            state.connected = false;
            state.dirty = false;
        }

        self.source.disconnect();
        self.dest.disconnect();
        if let Some(run_loop) = self.run_loop.upgrade() {
            run_loop.forget(self.id);
        }
        debug!(binding = ?self.id, "binding disconnected");
        true
    }
}
