//! Run Loop
//!
//! Bindings never write when they are dirtied. They queue here, and the host
//! calls [`RunLoop::flush`] once per tick to apply them.
//!
//! # Flushing
//!
//! A flush takes the queue as it stands when the flush starts and
//! synchronizes each binding once, in the order they were dirtied. Work
//! created while it runs (a binding dirtied by another binding's write, a
//! task scheduled by a task) waits for the next flush. After the bindings,
//! the flush closes the change brackets opened by [`RunLoop::coalesce`] and
//! then runs the tasks queued with [`RunLoop::invoke_last`].
//!
//! A failing binding or task is logged and counted; the rest of the flush
//! carries on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::link::{BindingId, BindingInner, SyncOutcome};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::object::{panic_message, Object, ObjectId};

type Task = Box<dyn FnOnce() + Send>;

/// Queue of deferred binding synchronizations.
///
/// Cloning the handle shares the queue.
#[derive(Clone)]
pub struct RunLoop {
    inner: Arc<Mutex<RunLoopState>>,
}

#[derive(Clone, Default)]
pub(crate) struct WeakRunLoop {
    inner: Weak<Mutex<RunLoopState>>,
}

struct RunLoopState {
    /// Dirty bindings, in the order they were dirtied.
    queue: IndexMap<BindingId, Arc<BindingInner>>,

    /// Every connected binding. The run loop owns them.
    bindings: IndexMap<BindingId, Arc<BindingInner>>,

    tasks: Vec<Task>,

    /// Objects with a change bracket the next flush closes.
    coalesced: IndexMap<ObjectId, Object>,

    tick: u64,
    max_settle_passes: usize,
}

impl Drop for RunLoopState {
    /// The last handle is gone: disconnect the bindings it owned and close
    /// the coalesced brackets. Queued tasks are dropped without running.
    fn drop(&mut self) {
        debug!(
            bindings = self.bindings.len(),
            coalesced = self.coalesced.len(),
            tasks = self.tasks.len(),
            "run loop dropped"
        );
        self.queue.clear();
        for (_, binding) in self.bindings.drain(..) {
            binding.disconnect();
        }
        for (_, object) in self.coalesced.drain(..) {
            object.end_property_changes();
        }
    }
}

/// What one flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Flush counter after this flush.
    pub tick: u64,
    /// Bindings that wrote a value.
    pub synced: usize,
    /// Bindings that were already in sync.
    pub unchanged: usize,
    /// Bindings or tasks that failed or panicked.
    pub failed: usize,
    /// Bindings disconnected before their turn.
    pub skipped: usize,
    /// Tasks run.
    pub tasks: usize,
}

impl FlushReport {
    /// True if the flush found nothing to do.
    pub fn is_empty(&self) -> bool {
        self.synced + self.unchanged + self.failed + self.skipped + self.tasks == 0
    }
}

impl RunLoop {
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    pub fn with_config(config: &RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunLoopState {
                queue: IndexMap::new(),
                bindings: IndexMap::new(),
                tasks: Vec::new(),
                coalesced: IndexMap::new(),
                tick: 0,
                max_settle_passes: config.max_settle_passes,
            })),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRunLoop {
        WeakRunLoop {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn register(&self, binding: Arc<BindingInner>) {
        self.inner.lock().bindings.insert(binding.id(), binding);
    }

    /// Queue a dirty binding. Returns `false` if it was already queued.
    pub(crate) fn enqueue(&self, binding: Arc<BindingInner>) -> bool {
        let id = binding.id();
        let mut state = self.inner.lock();
        if state.queue.contains_key(&id) {
            return false;
        }
        state.queue.insert(id, binding);
        debug!(binding = ?id, pending = state.queue.len(), "binding queued");
        true
    }

    /// Drop a binding and any queued synchronization for it.
    pub(crate) fn forget(&self, id: BindingId) {
        let mut state = self.inner.lock();
        let queued = state.queue.shift_remove(&id).is_some();
        state.bindings.shift_remove(&id);
        trace!(binding = ?id, queued, "binding removed from run loop");
    }

    /// Run `task` at the end of the next flush, after the bindings.
    pub fn invoke_last<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.lock().tasks.push(Box::new(task));
    }

    /// Hold back `object`'s notifications until the next flush.
    ///
    /// Opens a change bracket on the object that the next flush closes
    /// after the bindings ran. Returns `false` if the object is already
    /// coalesced.
    pub fn coalesce(&self, object: &Object) -> bool {
        {
            let mut state = self.inner.lock();
            if state.coalesced.contains_key(&object.id()) {
                return false;
            }
            state.coalesced.insert(object.id(), object.clone());
        }
        object.begin_property_changes();
        true
    }

    /// Apply everything queued before this call.
    pub fn flush(&self) -> FlushReport {
        let (batch, coalesced, tasks, tick) = {
            let mut state = self.inner.lock();
            state.tick += 1;
            (
                std::mem::take(&mut state.queue),
                std::mem::take(&mut state.coalesced),
                std::mem::take(&mut state.tasks),
                state.tick,
            )
        };

        let mut report = FlushReport {
            tick,
            ..FlushReport::default()
        };

        for (id, binding) in batch {
            if !binding.is_connected() {
                report.skipped += 1;
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| binding.sync())) {
                Ok(Ok(SyncOutcome::Synced)) => report.synced += 1,
                Ok(Ok(SyncOutcome::Unchanged)) => report.unchanged += 1,
                Ok(Err(Error::Disconnected)) => report.skipped += 1,
                Ok(Err(err)) => {
                    warn!(binding = ?id, error = %err, "binding sync failed");
                    report.failed += 1;
                }
                Err(payload) => {
                    error!(binding = ?id, panic = %panic_message(payload.as_ref()), "binding sync panicked");
                    report.failed += 1;
                }
            }
        }

        for object in coalesced.values() {
            object.end_property_changes();
        }

        for task in tasks {
            report.tasks += 1;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                error!(panic = %panic_message(payload.as_ref()), "deferred task panicked");
                report.failed += 1;
            }
        }

        if report.is_empty() && coalesced.is_empty() {
            trace!(tick, "empty flush");
        } else {
            debug!(
                tick,
                synced = report.synced,
                unchanged = report.unchanged,
                failed = report.failed,
                skipped = report.skipped,
                tasks = report.tasks,
                coalesced = coalesced.len(),
                "run loop flushed"
            );
        }
        report
    }

    /// Flush until there is nothing left to do.
    ///
    /// Returns the number of flushes run. Fails with
    /// [`Error::SettleLimit`] if work is still queued after the configured
    /// number of passes.
    pub fn settle(&self) -> Result<usize> {
        let limit = self.inner.lock().max_settle_passes;
        let mut passes = 0;
        while !self.is_idle() {
            if passes == limit {
                warn!(passes, pending = self.pending(), "run loop did not settle");
                return Err(Error::SettleLimit { passes });
            }
            self.flush();
            passes += 1;
        }
        Ok(passes)
    }

    /// Number of queued bindings.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Number of connected bindings.
    pub fn binding_count(&self) -> usize {
        self.inner.lock().bindings.len()
    }

    /// True when no bindings, brackets or tasks are waiting.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        state.queue.is_empty() && state.tasks.is_empty() && state.coalesced.is_empty()
    }

    /// Number of flushes so far.
    pub fn tick(&self) -> u64 {
        self.inner.lock().tick
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl WeakRunLoop {
    pub(crate) fn upgrade(&self) -> Option<RunLoop> {
        self.inner.upgrade().map(|inner| RunLoop { inner })
    }
}
