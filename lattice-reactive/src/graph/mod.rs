//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! signals, computeds, and effects.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes represent signals, computeds, or effects
//! - Edges represent reads: if A read B during its last evaluation, there
//!   is an edge from B (the source) to A (the observer)
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and flag them. Computeds are then pulled lazily, effects are queued.
//!
//! # Design Decisions
//!
//! 1. Nodes live in an index-based arena rather than pointing at each other
//!    directly. Edges are plain ids, so there is no ownership cycle between
//!    a signal and the things that read it.
//!
//! 2. Ids carry a generation. A node can be dropped by its owner at any
//!    time; ids left behind in other nodes' edge sets stop resolving and are
//!    skipped.
//!
//! 3. We maintain both forward (sources) and reverse (observers) edges to
//!    enable efficient traversal in both directions.

mod flags;
mod node;
mod store;

pub use flags::{DirtyState, Flags};
pub use node::{NodeId, NodeKind};

pub(crate) use node::{Handler, Node};
pub(crate) use store::DependencyGraph;
