//! Effect Scheduler
//!
//! Bookkeeping for deferred effect execution:
//!
//! - the pending-effects queue (insertion ordered, deduplicated)
//! - the batch depth counter
//! - the flushing flag
//!
//! The flush loop itself lives on [`Runtime::flush`](super::Runtime::flush);
//! this module only owns the state and the guards that keep it balanced.
//! Every increment or flag set is paired with a guard whose `Drop` undoes
//! it, so a panicking callback cannot leave the runtime stuck in "batching"
//! or "flushing".

use std::cell::{Cell, RefCell};

use indexmap::IndexSet;

use crate::graph::NodeId;

/// Queue of effects waiting to run, plus batch/flush state.
#[derive(Default)]
pub(crate) struct EffectQueue {
    pending: RefCell<IndexSet<NodeId>>,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
}

impl EffectQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue effects. Ones already queued keep their place.
    pub(crate) fn enqueue_all(&self, effects: impl IntoIterator<Item = NodeId>) {
        self.pending.borrow_mut().extend(effects);
    }

    /// Take the oldest queued effect.
    pub(crate) fn pop(&self) -> Option<NodeId> {
        self.pending.borrow_mut().shift_remove_index(0)
    }

    /// Drop an effect from the queue (disposal).
    pub(crate) fn remove(&self, effect: NodeId) -> bool {
        self.pending.borrow_mut().shift_remove(&effect)
    }

    /// Empty the queue, returning how many effects were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut pending = self.pending.borrow_mut();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn batch_depth(&self) -> usize {
        self.batch_depth.get()
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing.get()
    }
}

/// Holds the batch depth up for as long as it lives.
pub(crate) struct BatchGuard<'a> {
    queue: &'a EffectQueue,
}

impl<'a> BatchGuard<'a> {
    pub(crate) fn enter(queue: &'a EffectQueue) -> Self {
        queue.batch_depth.set(queue.batch_depth.get() + 1);
        Self { queue }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let depth = self.queue.batch_depth.get();
        debug_assert!(depth > 0, "batch depth underflow");
        self.queue.batch_depth.set(depth.saturating_sub(1));
    }
}

/// Marks a flush as in progress.
pub(crate) struct FlushGuard<'a> {
    queue: &'a EffectQueue,
}

impl<'a> FlushGuard<'a> {
    /// Start a flush, or return `None` if one is already running. Work
    /// queued while a flush is running is picked up by that flush.
    pub(crate) fn acquire(queue: &'a EffectQueue) -> Option<Self> {
        if queue.flushing.replace(true) {
            return None;
        }
        Some(Self { queue })
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.queue.flushing.set(false);
    }
}
