//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect),
//!    the runtime records an edge from the signal to that context.
//!
//! 2. When a signal's value changes, everything downstream is flagged and
//!    affected effects are queued.
//!
//! 3. Writing a value equal to the current one does nothing at all: no
//!    flags, no queue, no flush.
//!
//! # Ownership
//!
//! Cloning a `Signal` gives another handle to the same cell. The graph node
//! is removed when the last handle is dropped; computeds and effects that
//! still list it as a source just stop hearing from it.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::runtime::{Runtime, WeakRuntime};
use crate::error::ReactiveError;
use crate::graph::NodeId;

struct SignalInner<T> {
    id: NodeId,
    runtime: WeakRuntime,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_node(self.id);
        }
    }
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```
/// use lattice_reactive::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.signal(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies dependents)
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a signal in the calling thread's default runtime.
    pub fn new(value: T) -> Self {
        Self::new_in(&Runtime::current(), value)
    }

    pub(crate) fn new_in(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: runtime.create_node(crate::graph::NodeKind::Signal),
                runtime: runtime.downgrade(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Borrow the current value.
    ///
    /// Tracked like [`get`](Self::get), without the clone.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Number of computeds and effects that read this signal during their
    /// last run.
    pub fn observer_count(&self) -> usize {
        self.inner
            .runtime
            .upgrade()
            .map(|runtime| {
                runtime
                    .inner()
                    .graph
                    .borrow()
                    .get(self.inner.id)
                    .map_or(0, |node| node.observers.len())
            })
            .unwrap_or(0)
    }

    fn track(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track(self.inner.id);
        }
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a dependent.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Set a new value and notify dependents.
    ///
    /// Outside a batch this runs affected effects before returning; their
    /// first error (if any) is returned here. The value is stored either
    /// way.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return Ok(());
            }
            *current = value;
        }

        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.propagate(self.inner.id),
            None => Ok(()),
        }
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.borrow());
        self.set(new_value)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
