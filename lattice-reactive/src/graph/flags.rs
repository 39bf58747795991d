//! Node Flags
//!
//! Every node in the dependency graph carries a small bitmask describing
//! what kind of node it is and where it sits in its update cycle.
//!
//! # State Machine
//!
//! For computeds and effects:
//!
//! ```text
//! Clean --(source write)--> Pending | Dirty --(read/flush)--> Computing --> Clean
//!                                                                  \
//!                                                                   `--(error)--> Dirty
//! ```
//!
//! A node goes straight to `DIRTY` when it directly observes the changed
//! signal. Nodes reached only through other computeds become `PENDING`:
//! their inputs *might* have changed, and whether they actually did is
//! only worked out when somebody reads them.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Status bits carried by a graph node.
    ///
    /// The empty set is the clean state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Flags: u8 {
        /// The node is a signal and may be written directly.
        const WRITABLE  = 0b0000_0001;
        /// An effect is running its own body. Writes it makes must not
        /// re-queue it.
        const GUARDED   = 0b0000_0010;
        /// The node is the active tracking context.
        const TRACKING  = 0b0000_0100;
        /// The node's compute function is on the stack.
        const COMPUTING = 0b0000_1000;
        /// A direct source changed; the cached value is stale.
        const DIRTY     = 0b0001_0000;
        /// A transitive source may have changed.
        const PENDING   = 0b0010_0000;
    }
}

impl Flags {
    /// No pending work.
    pub const CLEAN: Flags = Flags::empty();

    /// Bits that mean the cached value cannot be trusted without a check.
    pub const STALE: Flags = Flags::DIRTY.union(Flags::PENDING);

    /// Bits that mean the node is part of the evaluation currently on the
    /// stack. Reading such a node is a cycle.
    pub const IN_FLIGHT: Flags = Flags::TRACKING.union(Flags::COMPUTING);

    /// Collapse the update bits into a [`DirtyState`].
    pub fn state(self) -> DirtyState {
        if self.contains(Flags::DIRTY) {
            DirtyState::Dirty
        } else if self.contains(Flags::PENDING) {
            DirtyState::Pending
        } else {
            DirtyState::Clean
        }
    }

    /// Mark as definitely stale. Supersedes `PENDING`.
    pub fn mark_dirty(&mut self) {
        self.remove(Flags::PENDING);
        self.insert(Flags::DIRTY);
    }

    /// Mark as possibly stale. A node that is already dirty stays dirty.
    pub fn mark_pending(&mut self) {
        if !self.contains(Flags::DIRTY) {
            self.insert(Flags::PENDING);
        }
    }
}

/// Freshness of a node's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirtyState {
    /// The cached value is up-to-date.
    Clean,

    /// An upstream node changed. Whether this node's inputs actually
    /// differ is resolved on the next read.
    Pending,

    /// A direct input changed. The node must recompute before its value
    /// is used.
    Dirty,
}
