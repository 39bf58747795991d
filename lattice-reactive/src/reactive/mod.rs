//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects, plus the batching and flushing that schedules them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only when somebody reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as updating a view or logging.
//!
//! ## Batches
//!
//! Writes inside [`batch`] mark the graph as usual but leave effects queued
//! until the outermost batch closes, so each effect sees the final state
//! once.
//!
//! # Implementation Notes
//!
//! The reactive system uses a per-runtime tracking slot to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.
//!
//! The free functions below operate on the calling thread's default
//! runtime ([`Runtime::current`]). Methods on [`Runtime`] do the same
//! against an explicit runtime.

mod computed;
mod context;
mod effect;
mod runtime;
mod scheduler;
mod signal;

pub use computed::Computed;
pub use effect::{Cleanup, Effect, EffectOutput};
pub use runtime::{Runtime, RuntimeStats};
pub use signal::Signal;

pub(crate) use runtime::Reactive;

use crate::error::{BoxError, ReactiveError};

/// Create a signal in the current thread's runtime.
pub fn signal<T: 'static>(value: T) -> Signal<T> {
    Runtime::current().signal(value)
}

/// Create a computed in the current thread's runtime.
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Runtime::current().computed(compute)
}

/// Create a fallible computed in the current thread's runtime.
pub fn try_computed<T, E, F>(compute: F) -> Computed<T>
where
    T: PartialEq + 'static,
    E: Into<BoxError>,
    F: Fn() -> Result<T, E> + 'static,
{
    Runtime::current().try_computed(compute)
}

/// Create an effect in the current thread's runtime.
pub fn effect<F, O>(run: F) -> Result<Effect, ReactiveError>
where
    F: FnMut() -> O + 'static,
    O: EffectOutput,
{
    Runtime::current().effect(run)
}

/// See [`Runtime::batch`].
pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
    Runtime::current().batch(f)
}

/// See [`Runtime::try_batch`].
pub fn try_batch<R, E>(f: impl FnOnce() -> Result<R, E>) -> Result<R, E>
where
    E: From<ReactiveError>,
{
    Runtime::current().try_batch(f)
}

/// See [`Runtime::untracked`].
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().untracked(f)
}

/// See [`Runtime::flush`].
pub fn flush() -> Result<(), ReactiveError> {
    Runtime::current().flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn free_functions_share_the_thread_runtime() {
        let count = signal(1);
        let doubled = {
            let count = count.clone();
            computed(move || count.get() * 2)
        };
        let seen = Rc::new(Cell::new(0));

        let watcher = {
            let (doubled, seen) = (doubled.clone(), seen.clone());
            effect(move || seen.set(doubled.get())).unwrap()
        };
        assert_eq!(seen.get(), 2);

        batch(|| {
            count.set(2).unwrap();
            count.set(3).unwrap();
            assert_eq!(seen.get(), 2);
        })
        .unwrap();
        assert_eq!(seen.get(), 6);
        assert_eq!(watcher.run_count(), 2);

        let untracked_value = untracked(|| doubled.get());
        assert_eq!(untracked_value, 6);
        flush().unwrap();

        watcher.dispose();
    }

    #[test]
    fn try_batch_hands_back_body_error() {
        let count = signal(0);
        let result: Result<(), ReactiveError> = try_batch(|| {
            count.set(1)?;
            Err(ReactiveError::callback("aborted"))
        });

        assert!(result.is_err());
        assert!(!Runtime::current().is_batching());
        assert_eq!(count.get(), 1);
    }
}
