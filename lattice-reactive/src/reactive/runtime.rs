//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! and effects. It owns the dependency graph, the tracking context and the
//! effect queue, and schedules updates when signals change.
//!
//! # How It Works
//!
//! 1. When a signal, computed or effect is created, it registers a node
//!    with the runtime.
//!
//! 2. When a computed or effect reads a signal or computed, the runtime
//!    records the edge.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks direct observers dirty and everything further downstream
//!       pending
//!    b. Queues the effects it reached
//!    c. Flushes the queue, unless a batch is open
//!    d. Leaves computeds alone - they recompute on next access
//!
//! 4. Reading a pending computed first asks its sources, in the order they
//!    were read, whether any of them really changed. The first one that did
//!    turns the computed dirty; if none did, the computed is clean again
//!    without running at all.
//!
//! # Threading
//!
//! A runtime is single-threaded (`!Send`). Each thread has its own default
//! runtime, used by [`Runtime::current`] and the free functions in
//! [`crate::reactive`]. Independent runtimes can be created with
//! [`Runtime::new`] and never share state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use super::computed::Computed;
use super::context::ReactiveContext;
use super::effect::{Effect, EffectOutput};
use super::scheduler::{BatchGuard, EffectQueue, FlushGuard};
use super::signal::Signal;
use crate::config::RuntimeConfig;
use crate::error::{BoxError, ConfigError, ReactiveError};
use crate::graph::{DependencyGraph, DirtyState, Flags, Handler, Node, NodeId, NodeKind};

/// A computation the runtime can re-run: the body of a computed or effect.
pub(crate) trait Reactive {
    /// Run the computation. Returns whether its output changed.
    fn run(&self, runtime: &Runtime) -> Result<bool, ReactiveError>;

    /// Release anything the computation holds (effect cleanups).
    fn dispose(&self, _runtime: &Runtime) {}
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) graph: RefCell<DependencyGraph>,
    /// The node currently collecting dependencies, if any.
    pub(crate) observer: Cell<Option<NodeId>>,
    pub(crate) scheduler: EffectQueue,
}

/// Handle to a reactive runtime.
///
/// Cloning is cheap and yields another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning runtime handle kept by signals, computeds and effects.
///
/// The runtime owns effects, effects own whatever they captured, and
/// those captures point back at the runtime; a strong handle here would
/// make that a reference cycle.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

thread_local! {
    static CURRENT: Runtime = Runtime::new();
}

/// Point-in-time counters describing a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub nodes: usize,
    pub signals: usize,
    pub computeds: usize,
    pub effects: usize,
    pub edges: usize,
    pub queued_effects: usize,
    pub batch_depth: usize,
    pub flushing: bool,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    ///
    /// The config is checked with [`RuntimeConfig::validate`] first.
    pub fn with_config(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(DependencyGraph::new()),
                observer: Cell::new(None),
                scheduler: EffectQueue::new(),
            }),
        }
    }

    /// The calling thread's default runtime.
    pub fn current() -> Runtime {
        CURRENT.with(Runtime::clone)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn inner(&self) -> &RuntimeInner {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    /// Whether two handles point at the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Create a signal holding `value`.
    pub fn signal<T: 'static>(&self, value: T) -> Signal<T> {
        Signal::new_in(self, value)
    }

    /// Create a lazily evaluated, memoized value.
    ///
    /// `compute` does not run until the first read.
    pub fn computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new_in(self, move || Ok(compute()))
    }

    /// Create a computed whose body can fail.
    ///
    /// An error leaves the computed dirty, so the next read tries again.
    pub fn try_computed<T, E, F>(&self, compute: F) -> Computed<T>
    where
        T: PartialEq + 'static,
        E: Into<BoxError>,
        F: Fn() -> Result<T, E> + 'static,
    {
        Computed::new_in(self, move || compute().map_err(ReactiveError::callback))
    }

    /// Create an effect. It runs once right away and again whenever
    /// something it read changes.
    ///
    /// Effects woken by writes in that first run are queued and run after
    /// it. If the first run or that follow-up flush fails, the effect is
    /// disposed and the error is returned.
    pub fn effect<F, O>(&self, run: F) -> Result<Effect, ReactiveError>
    where
        F: FnMut() -> O + 'static,
        O: EffectOutput,
    {
        Effect::new_in(self, run)
    }

    /// Run `f` with effects deferred until the outermost batch closes.
    ///
    /// If `f` panics the batch depth is still released, but nothing is
    /// flushed; effects queued so far stay queued for the next flush.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
        let value = {
            let _batch = BatchGuard::enter(&self.inner.scheduler);
            f()
        };
        self.close_batch()?;
        Ok(value)
    }

    /// Like [`batch`](Self::batch) for a fallible body.
    ///
    /// If `f` returns an error, the error is handed back and nothing is
    /// flushed. Writes made before the error still happened; their
    /// dependents stay dirty and their effects stay queued.
    pub fn try_batch<R, E>(&self, f: impl FnOnce() -> Result<R, E>) -> Result<R, E>
    where
        E: From<ReactiveError>,
    {
        let result = {
            let _batch = BatchGuard::enter(&self.inner.scheduler);
            f()
        };
        let value = result?;
        self.close_batch()?;
        Ok(value)
    }

    /// Run `f` without registering dependencies on the current observer.
    ///
    /// Computeds read inside still bring themselves up to date.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _context = ReactiveContext::enter(&self.inner, None);
        f()
    }

    /// Run every queued effect.
    ///
    /// Effects queued while the flush runs are picked up in a follow-up
    /// pass. Calling `flush` from inside a running flush is a no-op; the
    /// outer flush drains whatever was queued.
    ///
    /// A failing effect does not stop the flush. The first error is
    /// returned once the queue is empty; later ones are logged.
    pub fn flush(&self) -> Result<(), ReactiveError> {
        let scheduler = &self.inner.scheduler;
        let Some(_flushing) = FlushGuard::acquire(scheduler) else {
            return Ok(());
        };

        let mut first_error = None;
        let mut passes = 0;
        let mut processed = 0;

        loop {
            let pass_len = scheduler.len();
            if pass_len == 0 {
                break;
            }
            if passes == self.inner.config.max_flush_passes {
                let dropped = scheduler.clear();
                error!(passes, dropped, "flush did not settle, dropping queued effects");
                return Err(ReactiveError::FlushLimit { passes });
            }
            passes += 1;

            for _ in 0..pass_len {
                let Some(effect) = scheduler.pop() else {
                    break;
                };
                processed += 1;
                if let Err(err) = self.run_effect(effect) {
                    if first_error.is_none() {
                        first_error = Some(err);
                    } else {
                        warn!(effect = %effect, error = %err, "discarding secondary effect error");
                    }
                }
            }
        }

        if passes > 0 {
            debug!(passes, processed, "flush complete");
        }
        first_error.map_or(Ok(()), Err)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Whether a computed or effect is currently collecting dependencies.
    pub fn is_tracking(&self) -> bool {
        self.inner.observer.get().is_some()
    }

    /// The node currently collecting dependencies.
    pub fn current_observer(&self) -> Option<NodeId> {
        self.inner.observer.get()
    }

    /// Whether a batch is open.
    pub fn is_batching(&self) -> bool {
        self.inner.scheduler.is_batching()
    }

    /// Freshness of a node, or `None` if it no longer exists.
    pub fn node_state(&self, id: NodeId) -> Option<DirtyState> {
        self.inner.graph.borrow().get(id).map(Node::state)
    }

    pub fn stats(&self) -> RuntimeStats {
        let graph = self.inner.graph.borrow();
        let scheduler = &self.inner.scheduler;
        RuntimeStats {
            nodes: graph.len(),
            signals: graph.count_kind(NodeKind::Signal),
            computeds: graph.count_kind(NodeKind::Computed),
            effects: graph.count_kind(NodeKind::Effect),
            edges: graph.edge_count(),
            queued_effects: scheduler.len(),
            batch_depth: scheduler.batch_depth(),
            flushing: scheduler.is_flushing(),
        }
    }

    /// Check that every edge is recorded on both of its ends.
    ///
    /// Only meaningful between evaluations.
    pub fn edges_consistent(&self) -> bool {
        self.inner.graph.borrow().is_consistent()
    }

    // ------------------------------------------------------------------
    // Engine internals
    // ------------------------------------------------------------------

    pub(crate) fn flags(&self, id: NodeId) -> Option<Flags> {
        self.inner.graph.borrow().get(id).map(|node| node.flags)
    }

    pub(crate) fn create_node(&self, kind: NodeKind) -> NodeId {
        let id = self.inner.graph.borrow_mut().insert(Node::new(kind));
        trace!(node = %id, ?kind, "node created");
        id
    }

    pub(crate) fn attach(&self, id: NodeId, handler: Handler) {
        if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
            node.set_handler(handler);
        }
    }

    /// Remove a node and unlink it from its neighbours.
    ///
    /// Called from `Drop` impls, so it must tolerate being reached while
    /// the graph is already borrowed.
    pub(crate) fn remove_node(&self, id: NodeId) {
        let removed = match self.inner.graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove(id),
            Err(_) => {
                warn!(node = %id, "graph busy, node removal skipped");
                None
            }
        };
        self.inner.scheduler.remove(id);

        // Handlers run user code on disposal; the graph must be free by now
        let Some(mut node) = removed else {
            return;
        };
        trace!(node = %id, kind = ?node.kind(), "node removed");
        if let Some(handler) = node.take_handler().and_then(|h| h.upgrade()) {
            handler.dispose(self);
        }
    }

    /// Register `source` as a dependency of the current observer.
    pub(crate) fn track(&self, source: NodeId) {
        if let Some(observer) = self.inner.observer.get() {
            self.inner.graph.borrow_mut().link(source, observer);
        }
    }

    /// Read a computed: cycle check, track, then bring it up to date.
    pub(crate) fn read(&self, id: NodeId) -> Result<(), ReactiveError> {
        if self
            .flags(id)
            .is_some_and(|flags| flags.intersects(Flags::IN_FLIGHT))
        {
            return Err(ReactiveError::Cycle { node: id });
        }
        self.track(id);
        self.refresh(id)
    }

    /// A signal's value changed: mark downstream, queue effects, flush.
    pub(crate) fn propagate(&self, source: NodeId) -> Result<(), ReactiveError> {
        let effects = self.inner.graph.borrow_mut().mark_changed(source);
        trace!(source = %source, effects = effects.len(), "propagated write");

        self.inner.scheduler.enqueue_all(effects);
        self.flush_unless_batching()
    }

    /// Run `f` as if a flush were in progress: effects woken by writes
    /// inside it wait in the queue instead of running in the middle of `f`.
    pub(crate) fn defer_flush<R>(&self, f: impl FnOnce() -> R) -> R {
        let _flushing = FlushGuard::acquire(&self.inner.scheduler);
        f()
    }

    /// Flush now, unless an open batch will do it when it closes.
    pub(crate) fn flush_unless_batching(&self) -> Result<(), ReactiveError> {
        if self.inner.scheduler.is_batching() {
            return Ok(());
        }
        self.flush()
    }

    /// Bring a node up to date if it is dirty, or pending and one of its
    /// sources turns out to have changed.
    pub(crate) fn refresh(&self, id: NodeId) -> Result<(), ReactiveError> {
        let (flags, sources) = {
            let graph = self.inner.graph.borrow();
            let Some(node) = graph.get(id) else {
                return Ok(());
            };
            if node.flags.contains(Flags::COMPUTING) {
                return Err(ReactiveError::Cycle { node: id });
            }
            if !node.flags.intersects(Flags::STALE) {
                return Ok(());
            }
            let sources: SmallVec<[NodeId; 8]> = if node.flags.contains(Flags::DIRTY) {
                SmallVec::new()
            } else {
                node.sources.iter().copied().collect()
            };
            (node.flags, sources)
        };

        if !flags.contains(Flags::DIRTY) {
            for source in sources {
                self.refresh(source)?;
                // A changed source marks us dirty from inside its evaluation
                if self.flags(id).is_some_and(|f| f.contains(Flags::DIRTY)) {
                    break;
                }
            }

            let mut graph = self.inner.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return Ok(());
            };
            if !node.flags.contains(Flags::DIRTY) {
                node.flags.remove(Flags::PENDING);
                return Ok(());
            }
        }

        self.evaluate(id)
    }

    /// Run a node's computation with itself as the tracking context.
    fn evaluate(&self, id: NodeId) -> Result<(), ReactiveError> {
        let handler = {
            let graph = self.inner.graph.borrow();
            graph
                .get(id)
                .and_then(Node::handler)
                .and_then(Handler::upgrade)
        };
        let Some(handler) = handler else {
            return Ok(());
        };

        let evaluation = Evaluation::begin(self, id);
        let result = {
            let _context = ReactiveContext::enter(&self.inner, Some(id));
            handler.run(self)
        };
        let kind = evaluation.finish(result.is_ok());

        let changed = result?;
        if changed && kind == Some(NodeKind::Computed) {
            let effects = self.inner.graph.borrow_mut().mark_observers_dirty(id);
            self.inner.scheduler.enqueue_all(effects);
        }
        Ok(())
    }

    fn run_effect(&self, id: NodeId) -> Result<(), ReactiveError> {
        match self.flags(id) {
            // Disposed, already settled, or running further up the stack
            None => Ok(()),
            Some(flags) if !flags.intersects(Flags::STALE) => Ok(()),
            Some(flags) if flags.contains(Flags::COMPUTING) => Ok(()),
            Some(_) => self.refresh(id),
        }
    }

    fn close_batch(&self) -> Result<(), ReactiveError> {
        if self.inner.scheduler.is_batching() {
            return Ok(());
        }
        debug!(queued = self.inner.scheduler.len(), "batch closed");
        self.flush()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// One evaluation of a computed or effect.
///
/// Sets `COMPUTING` (and `GUARDED` for effects) and detaches the node's
/// sources so the run can record a fresh set. [`finish`](Self::finish)
/// reconciles the edges and flags; if the run unwinds instead, `Drop`
/// treats it as a failure.
struct Evaluation<'a> {
    runtime: &'a Runtime,
    id: NodeId,
    kind: Option<NodeKind>,
    previous: Option<IndexSet<NodeId>>,
}

impl<'a> Evaluation<'a> {
    fn begin(runtime: &'a Runtime, id: NodeId) -> Self {
        let mut graph = runtime.inner.graph.borrow_mut();
        let kind = graph.get_mut(id).map(|node| {
            node.flags.remove(Flags::STALE);
            node.flags.insert(Flags::COMPUTING);
            if node.is_effect() {
                node.flags.insert(Flags::GUARDED);
            }
            node.kind()
        });
        let previous = graph.take_sources(id);

        Self {
            runtime,
            id,
            kind,
            previous: Some(previous),
        }
    }

    fn finish(mut self, succeeded: bool) -> Option<NodeKind> {
        self.settle(succeeded);
        self.kind
    }

    fn settle(&mut self, succeeded: bool) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        let Ok(mut graph) = self.runtime.inner.graph.try_borrow_mut() else {
            return;
        };

        graph.settle_sources(self.id, previous, succeeded);
        let Some(node) = graph.get_mut(self.id) else {
            return;
        };
        node.flags.remove(Flags::COMPUTING | Flags::GUARDED);
        if !succeeded {
            node.flags.mark_dirty();
        } else if node.is_effect() {
            // Marks picked up while guarded came from the effect's own writes
            node.flags.remove(Flags::STALE);
        }
    }
}

impl Drop for Evaluation<'_> {
    fn drop(&mut self) {
        self.settle(false);
    }
}
