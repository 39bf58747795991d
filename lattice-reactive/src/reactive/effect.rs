//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies. Other effects woken by that run wait until it
//!    has finished.
//!
//! 2. When any dependency changes, the effect is queued and re-runs at the
//!    next flush (right away, unless a batch is open).
//!
//! 3. Before re-running, the effect's previous cleanup is called. The run
//!    then records a fresh set of dependencies; ones it no longer reads are
//!    dropped afterwards.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Self-writes
//!
//! While an effect runs it is guarded: writes it makes to signals it (even
//! transitively) depends on still mark it, but do not queue it again. An
//! effect that increments a counter it reads therefore runs once per outside
//! change, not forever.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is disposed. This is useful for
//! cleaning up resources like event listeners or timers.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::runtime::{Reactive, Runtime, WeakRuntime};
use crate::error::{BoxError, ReactiveError};
use crate::graph::{Handler, NodeId, NodeKind};

/// Teardown returned by an effect run.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// What an effect function may return.
///
/// | Return type | Meaning |
/// |-------------|---------|
/// | `()` | nothing to clean up |
/// | [`Cleanup`] | run before the next run and on disposal |
/// | `Result<(), E>` | a failed run, reported to whoever triggered it |
/// | `Result<Cleanup, E>` | both |
pub trait EffectOutput {
    fn into_outcome(self) -> Result<Option<Cleanup>, ReactiveError>;
}

impl EffectOutput for () {
    fn into_outcome(self) -> Result<Option<Cleanup>, ReactiveError> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_outcome(self) -> Result<Option<Cleanup>, ReactiveError> {
        Ok(Some(self))
    }
}

impl<E: Into<BoxError>> EffectOutput for Result<(), E> {
    fn into_outcome(self) -> Result<Option<Cleanup>, ReactiveError> {
        self.map(|()| None).map_err(ReactiveError::callback)
    }
}

impl<E: Into<BoxError>> EffectOutput for Result<Cleanup, E> {
    fn into_outcome(self) -> Result<Option<Cleanup>, ReactiveError> {
        self.map(Some).map_err(ReactiveError::callback)
    }
}

type RunFn = Box<dyn FnMut() -> Result<Option<Cleanup>, ReactiveError>>;

/// Counters shared between the graph-owned body and the user's handles.
#[derive(Default)]
struct EffectState {
    runs: Cell<usize>,
    disposed: Cell<bool>,
}

struct EffectInner {
    id: NodeId,
    run: RefCell<RunFn>,
    cleanup: RefCell<Option<Cleanup>>,
    state: Rc<EffectState>,
}

impl EffectInner {
    fn take_cleanup(&self) -> Option<Cleanup> {
        self.cleanup.borrow_mut().take()
    }
}

impl Reactive for EffectInner {
    fn run(&self, runtime: &Runtime) -> Result<bool, ReactiveError> {
        if let Some(cleanup) = self.take_cleanup() {
            runtime.untracked(|| cleanup.run());
        }

        let outcome = {
            let Ok(mut run) = self.run.try_borrow_mut() else {
                return Err(ReactiveError::Cycle { node: self.id });
            };
            self.state.runs.set(self.state.runs.get() + 1);
            (*run)()
        };

        if let Some(cleanup) = outcome? {
            if self.state.disposed.get() {
                // Disposed itself mid-run; nothing will ever call this later
                runtime.untracked(|| cleanup.run());
            } else {
                *self.cleanup.borrow_mut() = Some(cleanup);
            }
        }
        Ok(true)
    }

    fn dispose(&self, runtime: &Runtime) {
        self.state.disposed.set(true);
        if let Some(cleanup) = self.take_cleanup() {
            runtime.untracked(|| cleanup.run());
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        // Runtime teardown: still owe the last cleanup
        if let Some(cleanup) = self.cleanup.get_mut().take() {
            cleanup.run();
        }
    }
}

/// Handle to a side-effecting computation.
///
/// The runtime owns the effect; dropping the handle does not stop it. Call
/// [`dispose`](Self::dispose) to unsubscribe it.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use lattice_reactive::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.signal(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let effect = {
///     let (count, seen) = (count.clone(), seen.clone());
///     runtime.effect(move || seen.set(count.get())).unwrap()
/// };
///
/// count.set(5).unwrap();
/// assert_eq!(seen.get(), 5);
///
/// effect.dispose();
/// count.set(6).unwrap();
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    id: NodeId,
    runtime: WeakRuntime,
    state: Rc<EffectState>,
}

impl Effect {
    /// Create an effect in the calling thread's default runtime.
    ///
    /// The effect runs immediately to establish its initial dependencies.
    pub fn new<F, O>(run: F) -> Result<Self, ReactiveError>
    where
        F: FnMut() -> O + 'static,
        O: EffectOutput,
    {
        Runtime::current().effect(run)
    }

    pub(crate) fn new_in<F, O>(runtime: &Runtime, mut run: F) -> Result<Self, ReactiveError>
    where
        F: FnMut() -> O + 'static,
        O: EffectOutput,
    {
        let id = runtime.create_node(NodeKind::Effect);
        let state = Rc::new(EffectState::default());

        let body: Rc<dyn Reactive> = Rc::new(EffectInner {
            id,
            run: RefCell::new(Box::new(move || run().into_outcome())),
            cleanup: RefCell::new(None),
            state: Rc::clone(&state),
        });
        runtime.attach(id, Handler::Owned(body));

        let effect = Self {
            id,
            runtime: runtime.downgrade(),
            state,
        };

        // Effects woken by the first run's writes run after it, not inside it
        let first_run = runtime.defer_flush(|| runtime.refresh(id));
        if first_run.is_err() {
            effect.dispose();
        }
        let drained = runtime.flush_unless_batching();

        match (first_run, drained) {
            (Ok(()), Ok(())) => Ok(effect),
            (Err(err), drained) => {
                if let Err(later) = drained {
                    warn!(effect = %id, error = %later, "discarding flush error after failed first run");
                }
                Err(err)
            }
            (Ok(()), Err(err)) => {
                effect.dispose();
                Err(err)
            }
        }
    }

    /// Get the effect's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Stop the effect.
    ///
    /// Runs the pending cleanup and unlinks the effect from everything it
    /// read. Disposing twice is a no-op. Disposing from inside the effect's
    /// own run is allowed; the run finishes and its cleanup is called at
    /// once.
    pub fn dispose(&self) {
        if self.state.disposed.get() {
            return;
        }
        match self.runtime.upgrade() {
            Some(runtime) => runtime.remove_node(self.id),
            None => self.state.disposed.set(true),
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.get()
    }

    /// How many times the effect function has been called.
    pub fn run_count(&self) -> usize {
        self.state.runs.get()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("runs", &self.state.runs.get())
            .field("disposed", &self.state.disposed.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
