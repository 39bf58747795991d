//! Graph Nodes
//!
//! This module defines the node records that live in the dependency graph.

use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::flags::{DirtyState, Flags};
use crate::reactive::Reactive;

/// Identifier for a node in the dependency graph.
///
/// A `NodeId` is an index into the graph's arena plus the generation of
/// the slot at the time the node was inserted. Once the node is removed
/// the slot's generation moves on, so stale ids held by other nodes simply
/// stop resolving instead of aliasing whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot this id was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.index, self.generation)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A signal. These are the roots of the graph.
    /// They have no sources, only observers.
    Signal,

    /// A computed value. These have sources and may have observers.
    /// They cache their result.
    Computed,

    /// An effect. These are leaves of the graph.
    /// They have sources but no observers.
    Effect,
}

/// How the graph reaches the code that re-evaluates a node.
///
/// Computeds are owned by their handles, so the graph only keeps a weak
/// reference. Effects have no owning handle (the [`Effect`] handle is just
/// a way to dispose them), so the graph owns them until disposal.
///
/// [`Effect`]: crate::reactive::Effect
#[derive(Clone)]
pub(crate) enum Handler {
    Shared(Weak<dyn Reactive>),
    Owned(Rc<dyn Reactive>),
}

impl Handler {
    pub(crate) fn upgrade(&self) -> Option<Rc<dyn Reactive>> {
        match self {
            Handler::Shared(weak) => weak.upgrade(),
            Handler::Owned(rc) => Some(Rc::clone(rc)),
        }
    }
}

/// A node in the dependency graph.
pub(crate) struct Node {
    /// What kind of node this is.
    kind: NodeKind,

    /// Current status bits.
    pub(crate) flags: Flags,

    /// Nodes that this node read during its last evaluation, in read order.
    pub(crate) sources: IndexSet<NodeId>,

    /// Nodes that read this node during their last evaluation.
    pub(crate) observers: IndexSet<NodeId>,

    /// Re-evaluation entry point (computeds and effects only).
    handler: Option<Handler>,
}

impl Node {
    /// Create a new node with the given kind.
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            flags: match kind {
                NodeKind::Signal => Flags::WRITABLE,
                // Start dirty so the first read computes
                NodeKind::Computed => Flags::DIRTY,
                NodeKind::Effect => Flags::DIRTY,
            },
            sources: IndexSet::new(),
            observers: IndexSet::new(),
            handler: None,
        }
    }

    pub(crate) fn set_handler(&mut self, handler: Handler) {
        self.handler = Some(handler);
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    pub(crate) fn take_handler(&mut self) -> Option<Handler> {
        self.handler.take()
    }

    pub(crate) fn state(&self) -> DirtyState {
        self.flags.state()
    }

    pub(crate) fn is_effect(&self) -> bool {
        self.kind == NodeKind::Effect
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("sources", &self.sources)
            .field("observers", &self.observers)
            .finish()
    }
}
