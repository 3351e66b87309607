//! Evaluation Context
//!
//! Tracks which computed properties are currently being evaluated on this
//! thread. Dependency cycles that pass through paths (and therefore cannot
//! be seen in a single object's key graph) show up here as a property that
//! is entered while it is already on the stack.
//!
//! # Implementation
//!
//! A thread-local stack of `(object, key)` frames. Entering pushes a frame
//! and returns a guard; dropping the guard pops it, so the stack stays
//! balanced even if an evaluator panics. A refused re-entry marks every
//! frame from the repeated property up to the top as cyclic, so none of
//! those evaluations reports (or caches) a result.
//!
//! A second stack records the keys whose observers are running. A path
//! dependency that reports a change to a key while that key is still being
//! dispatched has come back around a cycle of computed properties.

use std::cell::RefCell;

use crate::object::ObjectId;

thread_local! {
    static EVALUATION_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static DISPATCH_STACK: RefCell<Vec<(ObjectId, Box<str>)>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    object: ObjectId,
    key: Box<str>,
    cyclic: bool,
}

/// Guard for one computed-property evaluation.
pub struct EvaluationContext {
    object: ObjectId,
}

impl EvaluationContext {
    /// Enter an evaluation of `key` on `object`.
    ///
    /// Returns `None` if the same property is already being evaluated
    /// further up the stack.
    pub fn enter(object: ObjectId, key: &str) -> Option<Self> {
        EVALUATION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack
                .iter()
                .position(|frame| frame.object == object && &*frame.key == key)
            {
                for frame in &mut stack[start..] {
                    frame.cyclic = true;
                }
                return None;
            }
            stack.push(Frame {
                object,
                key: key.into(),
                cyclic: false,
            });
            Some(Self { object })
        })
    }

    /// True if the evaluation behind this guard ran into a cycle.
    pub fn is_cyclic(&self) -> bool {
        EVALUATION_STACK.with(|stack| stack.borrow().last().is_some_and(|frame| frame.cyclic))
    }

    /// Check if any evaluation is in progress.
    pub fn is_active() -> bool {
        EVALUATION_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Current nesting depth.
    pub fn depth() -> usize {
        EVALUATION_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for EvaluationContext {
    fn drop(&mut self) {
        EVALUATION_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.object, self.object,
                    "EvaluationContext mismatch: expected {:?}, got {:?}",
                    self.object, frame.object
                );
            }
        });
    }
}

/// Guard for the dispatch of one key's observers.
pub struct DispatchContext {
    object: ObjectId,
}

impl DispatchContext {
    /// Mark `key` on `object` as being dispatched until the guard drops.
    pub fn enter(object: ObjectId, key: &str) -> Self {
        DISPATCH_STACK.with(|stack| stack.borrow_mut().push((object, key.into())));
        Self { object }
    }

    /// Check whether observers of `key` on `object` are running on this
    /// thread.
    pub fn is_dispatching(object: ObjectId, key: &str) -> bool {
        DISPATCH_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|(id, current)| *id == object && &**current == key)
        })
    }
}

impl Drop for DispatchContext {
    fn drop(&mut self) {
        DISPATCH_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(popped.map(|(id, _)| id), Some(self.object));
        });
    }
}
