//! Lattice Reactive
//!
//! This crate provides the fine-grained reactive engine underneath the
//! Lattice UI framework. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - The dependency graph those primitives register in
//! - Change propagation with dirty/pending marking
//! - Batching and flushing of effects
//!
//! Rendering, transport and the Python bindings sit on top of this crate
//! and only ever talk to it through the primitives below.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, tracking and scheduling
//! - `graph`: Node arena, status flags and the propagation walk
//! - `config`: Runtime tunables
//! - `error`: Error types
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use lattice_reactive::{batch, computed, effect, signal};
//!
//! // Create a signal
//! let count = signal(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     computed(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _watcher = {
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     effect(move || log.borrow_mut().push((count.get(), doubled.get()))).unwrap()
//! };
//!
//! // Update the signal: the effect runs again right away
//! count.set(5).unwrap();
//!
//! // Several writes, one run
//! batch(|| {
//!     count.set(6).unwrap();
//!     count.set(7).unwrap();
//! })
//! .unwrap();
//!
//! assert_eq!(*log.borrow(), [(0, 0), (5, 10), (7, 14)]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{BoxError, ConfigError, ReactiveError};
pub use graph::{DirtyState, NodeId, NodeKind};
pub use reactive::{
    batch, computed, effect, flush, signal, try_batch, try_computed, untracked, Cleanup, Computed,
    Effect, EffectOutput, Runtime, RuntimeStats, Signal,
};
