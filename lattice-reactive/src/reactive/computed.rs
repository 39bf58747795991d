//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its function and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns the
//!    cached value.
//!
//! 3. When a dependency changes, the computed is marked dirty (direct
//!    dependency) or pending (somewhere further upstream).
//!
//! 4. On next access, a pending computed first re-checks its sources. If
//!    none of them actually produced a new value, it goes back to clean
//!    without running.
//!
//! 5. If it does recompute and the result equals the cached one, its own
//!    observers are not disturbed.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually accessed will recompute
//! - Computeds that are never read stay dirty (no wasted work)

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::runtime::{Reactive, Runtime, WeakRuntime};
use crate::error::{BoxError, ReactiveError};
use crate::graph::{DirtyState, Handler, NodeId, NodeKind};

type ComputeFn<T> = Box<dyn Fn() -> Result<T, ReactiveError>>;

struct ComputedInner<T> {
    id: NodeId,
    runtime: WeakRuntime,
    compute: ComputeFn<T>,
    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,
}

impl<T: PartialEq + 'static> Reactive for ComputedInner<T> {
    fn run(&self, _runtime: &Runtime) -> Result<bool, ReactiveError> {
        let next = (self.compute)()?;

        let mut value = self.value.borrow_mut();
        if value.as_ref() == Some(&next) {
            return Ok(false);
        }
        *value = Some(next);
        Ok(true)
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_node(self.id);
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound is needed to detect when the computed value
/// actually changed (some computeds return the same value even if their
/// inputs changed).
///
/// # Example
///
/// ```
/// use lattice_reactive::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.signal(2);
/// let doubled = {
///     let count = count.clone();
///     runtime.computed(move || count.get() * 2)
/// };
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5).unwrap();
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: PartialEq + 'static> Computed<T> {
    /// Create a computed in the calling thread's default runtime.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Runtime::current().computed(compute)
    }

    pub(crate) fn new_in<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> Result<T, ReactiveError> + 'static,
    {
        let id = runtime.create_node(NodeKind::Computed);
        let inner = Rc::new(ComputedInner {
            id,
            runtime: runtime.downgrade(),
            compute: Box::new(compute),
            value: RefCell::new(None),
        });

        let shared: Rc<dyn Reactive> = inner.clone();
        runtime.attach(id, Handler::Shared(Rc::downgrade(&shared)));

        Self { inner }
    }

    /// Create a fallible computed in the calling thread's default runtime.
    pub fn try_new<E, F>(compute: F) -> Self
    where
        E: Into<BoxError>,
        F: Fn() -> Result<T, E> + 'static,
    {
        Runtime::current().try_computed(compute)
    }
}

impl<T: 'static> Computed<T> {
    /// Get the computed's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Current freshness. A computed whose runtime is gone reports dirty.
    pub fn state(&self) -> DirtyState {
        self.inner
            .runtime
            .upgrade()
            .and_then(|runtime| runtime.node_state(self.inner.id))
            .unwrap_or(DirtyState::Dirty)
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Borrow the up-to-date value.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ReactiveError> {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.read(self.inner.id)?;
        }

        if let Some(value) = self.inner.value.borrow().as_ref() {
            return Ok(f(value));
        }

        // No runtime left to track it (or its node is gone): the cache is
        // filled once by a plain run
        let value = (self.inner.compute)()?;
        let result = f(&value);
        *self.inner.value.borrow_mut() = Some(value);
        Ok(result)
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a computed's value. If
    /// called within a reactive context, this also registers the current
    /// computation as a dependent.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.try_with(T::clone)
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the computation fails or reads itself. Use
    /// [`try_get`](Self::try_get) to handle those cases.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("computed {} failed: {err}", self.inner.id),
        }
    }

    /// Get the current value without registering a dependency.
    pub fn try_get_untracked(&self) -> Result<T, ReactiveError> {
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.untracked(|| self.try_get()),
            None => self.try_get(),
        }
    }

    /// Untracked [`get`](Self::get). Panics under the same conditions.
    pub fn get_untracked(&self) -> T {
        match self.try_get_untracked() {
            Ok(value) => value,
            Err(err) => panic!("computed {} failed: {err}", self.inner.id),
        }
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn computed_runs_on_first_access() {
        let runtime = Runtime::new();
        let (calls, calls_inner) = counter();

        let computed = runtime.computed(move || {
            calls_inner.set(calls_inner.get() + 1);
            42
        });

        // Not computed yet
        assert!(!computed.has_value());
        assert_eq!(computed.state(), DirtyState::Dirty);
        assert_eq!(calls.get(), 0);

        // First access triggers computation
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.get(), 1);
        assert!(computed.has_value());
        assert_eq!(computed.state(), DirtyState::Clean);
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let runtime = Runtime::new();
        let (calls, calls_inner) = counter();

        let computed = runtime.computed(move || {
            calls_inner.set(calls_inner.get() + 1);
            42
        });

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_recomputes_after_source_write() {
        let runtime = Runtime::new();
        let (calls, calls_inner) = counter();
        let source = runtime.signal(1);

        let computed = {
            let source = source.clone();
            runtime.computed(move || {
                calls_inner.set(calls_inner.get() + 1);
                source.get() * 10
            })
        };

        assert_eq!(computed.get(), 10);
        source.set(2).unwrap();
        assert_eq!(computed.state(), DirtyState::Dirty);
        assert_eq!(computed.get(), 20);
        assert_eq!(computed.get(), 20);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn pending_computed_skips_work_when_upstream_value_is_unchanged() {
        let runtime = Runtime::new();
        let (calls, calls_inner) = counter();
        let source = runtime.signal(3);

        let parity = {
            let source = source.clone();
            runtime.computed(move || source.get() % 2)
        };
        let label = {
            let parity = parity.clone();
            runtime.computed(move || {
                calls_inner.set(calls_inner.get() + 1);
                if parity.get() == 0 { "even" } else { "odd" }
            })
        };

        assert_eq!(label.get(), "odd");
        source.set(5).unwrap();
        assert_eq!(label.state(), DirtyState::Pending);

        // parity recomputes to the same value, so label does not run
        assert_eq!(label.get(), "odd");
        assert_eq!(calls.get(), 1);
        assert_eq!(label.state(), DirtyState::Clean);

        source.set(6).unwrap();
        assert_eq!(label.get(), "even");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn dependencies_shrink_with_branches() {
        let runtime = Runtime::new();
        let flag = runtime.signal(true);
        let a = runtime.signal(1);
        let b = runtime.signal(2);

        let pick = {
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            runtime.computed(move || if flag.get() { a.get() } else { b.get() })
        };

        assert_eq!(pick.get(), 1);
        assert_eq!(a.observer_count(), 1);
        assert_eq!(b.observer_count(), 0);

        flag.set(false).unwrap();
        assert_eq!(pick.get(), 2);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);

        // `a` is no longer a dependency
        a.set(100).unwrap();
        assert_eq!(pick.state(), DirtyState::Clean);
        assert!(runtime.edges_consistent());
    }

    #[test]
    fn failing_computed_stays_dirty_and_retries() {
        let runtime = Runtime::new();
        let input = runtime.signal(-1);

        let root = {
            let input = input.clone();
            runtime.try_computed(move || {
                let value = input.get();
                if value < 0 {
                    Err(format!("negative input {value}"))
                } else {
                    Ok(value * 2)
                }
            })
        };

        let err = root.try_get().unwrap_err();
        assert!(matches!(err, ReactiveError::Callback(_)));
        assert_eq!(root.state(), DirtyState::Dirty);
        // The failed run still subscribed to its input
        assert_eq!(input.observer_count(), 1);

        input.set(4).unwrap();
        assert_eq!(root.try_get().unwrap(), 8);
        assert_eq!(root.state(), DirtyState::Clean);
    }

    #[test]
    fn self_read_is_a_cycle() {
        let runtime = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));

        let computed = {
            let slot = slot.clone();
            runtime.try_computed(move || -> Result<i32, ReactiveError> {
                let me = slot.borrow().clone();
                match me {
                    Some(me) => Ok(me.try_get()? + 1),
                    None => Ok(0),
                }
            })
        };
        *slot.borrow_mut() = Some(computed.clone());

        let err = computed.try_get().unwrap_err();
        assert!(err.is_cycle());
        assert!(!runtime.is_tracking());

        // Break the Rc cycle through the closure
        slot.borrow_mut().take();
    }

    #[test]
    fn mutual_recursion_is_a_cycle() {
        let runtime = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));

        let a = {
            let slot = slot.clone();
            runtime.try_computed(move || -> Result<i32, ReactiveError> {
                let b = slot.borrow().clone();
                match b {
                    Some(b) => b.try_get(),
                    None => Ok(0),
                }
            })
        };
        let b = {
            let a = a.clone();
            runtime.try_computed(move || a.try_get().map(|v| v + 1))
        };
        *slot.borrow_mut() = Some(b.clone());

        assert!(b.try_get().unwrap_err().is_cycle());
        slot.borrow_mut().take();
    }

    #[test]
    fn untracked_get_still_refreshes() {
        let runtime = Runtime::new();
        let source = runtime.signal(1);
        let inner = {
            let source = source.clone();
            runtime.computed(move || source.get() + 1)
        };
        let outer = {
            let inner = inner.clone();
            runtime.computed(move || inner.try_get_untracked().unwrap_or_default())
        };

        assert_eq!(outer.get(), 2);
        source.set(5).unwrap();
        // outer does not depend on inner, so it keeps its cached value
        assert_eq!(outer.get(), 2);
        // but inner itself is fresh when read untracked
        assert_eq!(inner.try_get_untracked().unwrap(), 6);
    }

    #[test]
    fn dropping_computed_unlinks_it() {
        let runtime = Runtime::new();
        let source = runtime.signal(1);
        let computed = {
            let source = source.clone();
            runtime.computed(move || source.get())
        };
        computed.get();
        assert_eq!(source.observer_count(), 1);

        drop(computed);
        assert_eq!(source.observer_count(), 0);
        assert_eq!(runtime.stats().computeds, 0);
        source.set(2).unwrap();
    }

    #[test]
    fn computed_clone_shares_state() {
        let runtime = Runtime::new();
        let computed1 = runtime.computed(|| 42);
        assert_eq!(computed1.get(), 42);

        let computed2 = computed1.clone();
        assert_eq!(computed1.id(), computed2.id());
        assert!(computed2.has_value());
        assert_eq!(computed2.get(), 42);
    }

    #[test]
    fn computed_outliving_its_runtime_still_evaluates() {
        let runtime = Runtime::new();
        let (calls, calls_inner) = counter();
        let computed = runtime.computed(move || {
            calls_inner.set(calls_inner.get() + 1);
            5
        });
        drop(runtime);

        assert!(!computed.has_value());
        assert_eq!(computed.try_get().unwrap(), 5);
        assert!(computed.has_value());

        // Cached from here on
        assert_eq!(computed.try_with(|value| value * 2).unwrap(), 10);
        assert_eq!(calls.get(), 1);
        assert_eq!(computed.state(), DirtyState::Dirty);
    }
}
