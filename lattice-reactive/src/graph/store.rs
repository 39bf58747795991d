//! Dependency Graph Storage
//!
//! Nodes live in a generational arena and refer to each other by
//! [`NodeId`]. Edges are kept twice, once on each end:
//!
//! - `observer.sources` lists what the observer read
//! - `source.observers` lists who read the source
//!
//! Outside of an in-progress evaluation the two sides always mirror each
//! other. Edges are bookkeeping only; they never keep a node alive. When a
//! node's owner drops it, the node is removed and unlinked from both sides.
//!
//! # Marking
//!
//! When a signal is written, [`DependencyGraph::mark_changed`] walks the
//! observers breadth-first:
//!
//! 1. Direct observers of the signal become `DIRTY`
//! 2. Everything reached further downstream becomes `PENDING`
//! 3. Every effect reached (unless guarded) is collected for the queue
//!
//! Each node is visited at most once per walk, so diamond-shaped graphs
//! cost one visit per node rather than one per path.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::flags::Flags;
use super::node::{Node, NodeId, NodeKind};

/// Effects collected by a marking walk, in discovery order.
pub(crate) type EffectList = SmallVec<[NodeId; 8]>;

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The dependency graph: every live node plus the edges between them.
#[derive(Default)]
pub(crate) struct DependencyGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. The removed record is
    /// handed back so the caller can drop its handler outside any borrow
    /// of the graph.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;

        for source_id in &node.sources {
            if let Some(source) = self.get_mut(*source_id) {
                source.observers.swap_remove(&id);
            }
        }
        for observer_id in &node.observers {
            if let Some(observer) = self.get_mut(*observer_id) {
                observer.sources.shift_remove(&id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    /// Get a mutable reference to a node.
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node
                .as_ref()
                .map(|node| (NodeId::new(index as u32, slot.generation), node))
        })
    }

    /// Add a dependency edge: `observer` read `source`.
    ///
    /// Idempotent. Returns `true` if the edge is new.
    pub(crate) fn link(&mut self, source: NodeId, observer: NodeId) -> bool {
        if source == observer || !self.contains(source) {
            return false;
        }
        let Some(observer_node) = self.get_mut(observer) else {
            return false;
        };
        let added = observer_node.sources.insert(source);
        if let Some(source_node) = self.get_mut(source) {
            source_node.observers.insert(observer);
        }
        added
    }

    /// Remove a dependency edge.
    pub(crate) fn unlink(&mut self, source: NodeId, observer: NodeId) {
        if let Some(source_node) = self.get_mut(source) {
            source_node.observers.swap_remove(&observer);
        }
        if let Some(observer_node) = self.get_mut(observer) {
            observer_node.sources.shift_remove(&source);
        }
    }

    /// Detach an observer's source list ahead of a re-evaluation.
    ///
    /// The sources keep their back-references until
    /// [`settle_sources`](Self::settle_sources) decides which of them are
    /// stale.
    pub(crate) fn take_sources(&mut self, observer: NodeId) -> IndexSet<NodeId> {
        self.get_mut(observer)
            .map(|node| std::mem::take(&mut node.sources))
            .unwrap_or_default()
    }

    /// Reconcile an observer's edges after a re-evaluation.
    ///
    /// On success, sources from `previous` that were not read again are
    /// unlinked. On failure the previous sources are merged back in, so a
    /// failed run never loses a subscription it had.
    pub(crate) fn settle_sources(
        &mut self,
        observer: NodeId,
        previous: IndexSet<NodeId>,
        succeeded: bool,
    ) {
        if !self.contains(observer) {
            // Removed mid-run; only the detached back-references are left
            for source in previous {
                self.unlink(source, observer);
            }
            return;
        }

        if succeeded {
            let stale: SmallVec<[NodeId; 8]> = match self.get(observer) {
                Some(node) => previous
                    .into_iter()
                    .filter(|source| !node.sources.contains(source))
                    .collect(),
                None => return,
            };
            for source in stale {
                self.unlink(source, observer);
            }
        } else {
            // Sources removed while the run was in flight are dropped
            let live: SmallVec<[NodeId; 8]> = previous
                .into_iter()
                .filter(|source| self.contains(*source))
                .collect();
            if let Some(node) = self.get_mut(observer) {
                node.sources.extend(live);
            }
        }
    }

    /// Mark everything downstream of `source` after it was written.
    ///
    /// Returns the effects that need to be queued, in discovery order.
    pub(crate) fn mark_changed(&mut self, source: NodeId) -> EffectList {
        let mut effects = EffectList::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        // Start with the source node's direct observers
        if let Some(node) = self.get(source) {
            queue.extend(node.observers.iter().map(|id| (*id, true)));
        }

        // BFS so every direct observer is seen before anything transitive
        while let Some((id, direct)) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            // Dropped observers are skipped
            let Some(node) = self.get_mut(id) else {
                continue;
            };

            if direct {
                node.flags.mark_dirty();
            } else {
                node.flags.mark_pending();
            }

            if node.is_effect() && !node.flags.contains(Flags::GUARDED) {
                effects.push(id);
            }

            queue.extend(node.observers.iter().map(|id| (*id, false)));
        }

        effects
    }

    /// Mark the direct observers of a computed whose value just changed.
    ///
    /// Observers that are themselves mid-evaluation are skipped: they are
    /// reading the fresh value right now. Returns effects that were clean
    /// before this call and therefore are not in the queue yet.
    pub(crate) fn mark_observers_dirty(&mut self, source: NodeId) -> EffectList {
        let mut effects = EffectList::new();
        let observers: SmallVec<[NodeId; 8]> = match self.get(source) {
            Some(node) => node.observers.iter().copied().collect(),
            None => return effects,
        };

        for id in observers {
            let Some(node) = self.get_mut(id) else {
                continue;
            };
            if node.flags.contains(Flags::COMPUTING) {
                continue;
            }
            let was_stale = node.flags.intersects(Flags::STALE);
            node.flags.mark_dirty();
            if node.is_effect() && !was_stale && !node.flags.contains(Flags::GUARDED) {
                effects.push(id);
            }
        }

        effects
    }

    /// Total number of edges.
    pub(crate) fn edge_count(&self) -> usize {
        self.iter().map(|(_, node)| node.sources.len()).sum()
    }

    /// Number of live nodes of the given kind.
    pub(crate) fn count_kind(&self, kind: NodeKind) -> usize {
        self.iter().filter(|(_, node)| node.kind() == kind).count()
    }

    /// Check that every edge is recorded on both of its ends.
    pub(crate) fn is_consistent(&self) -> bool {
        self.iter().all(|(id, node)| {
            let sources_ok = node.sources.iter().all(|source| {
                self.get(*source)
                    .is_some_and(|source| source.observers.contains(&id))
            });
            let observers_ok = node.observers.iter().all(|observer| {
                self.get(*observer)
                    .is_some_and(|observer| observer.sources.contains(&id))
            });
            sources_ok && observers_ok
        })
    }
}
