//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! The runtime holds a single slot naming the node being evaluated (or
//! nothing, when no computation is running or inside `untracked`). Entering
//! a context swaps the slot and remembers what was there; the guard puts it
//! back on drop. Nesting (a computed that reads another computed) falls out
//! of the save/restore: the inner evaluation gets the slot, and the outer
//! one gets it back once the inner guard goes away.
//!
//! The node owning the slot also carries the `TRACKING` flag so the graph
//! itself can tell which node is collecting reads.

use super::runtime::RuntimeInner;
use crate::graph::{Flags, NodeId};

/// Guard that restores the previous context when dropped.
///
/// This ensures the context slot is properly restored even if the
/// computation panics.
pub(crate) struct ReactiveContext<'a> {
    runtime: &'a RuntimeInner,
    current: Option<NodeId>,
    previous: Option<NodeId>,
}

impl<'a> ReactiveContext<'a> {
    /// Make `observer` the target of dependency tracking until the guard
    /// drops. `None` suspends tracking.
    pub(crate) fn enter(runtime: &'a RuntimeInner, observer: Option<NodeId>) -> Self {
        let previous = runtime.observer.replace(observer);
        swap_tracking_flag(runtime, previous, observer);

        Self {
            runtime,
            current: observer,
            previous,
        }
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let current = self.runtime.observer.replace(self.previous);
        debug_assert_eq!(
            current, self.current,
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            self.current, current
        );
        swap_tracking_flag(self.runtime, self.current, self.previous);
    }
}

fn swap_tracking_flag(runtime: &RuntimeInner, from: Option<NodeId>, to: Option<NodeId>) {
    if from == to {
        return;
    }
    // Guards also run during unwinding; never panic on a held borrow here
    let Ok(mut graph) = runtime.graph.try_borrow_mut() else {
        return;
    };
    if let Some(node) = from.and_then(|id| graph.get_mut(id)) {
        node.flags.remove(Flags::TRACKING);
    }
    if let Some(node) = to.and_then(|id| graph.get_mut(id)) {
        node.flags.insert(Flags::TRACKING);
    }
}
