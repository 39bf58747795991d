//! Reactive errors.
//!
//! | Error | Raised when |
//! |-------|-------------|
//! | [`ReactiveError::Cycle`] | a node is read while its own evaluation is on the stack |
//! | [`ReactiveError::Callback`] | a user computation or effect returned an error |
//! | [`ReactiveError::FlushLimit`] | effects kept re-triggering each other past the pass limit |
//!
//! Errors from user callbacks are handed back to whoever triggered the
//! evaluation: the reader of a computed, or the caller of `set`, `batch`
//! or `flush` that ran a failing effect. They are never swallowed.

use std::error::Error as StdError;

use thiserror::Error;

use crate::graph::NodeId;

/// Boxed user error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A computed read itself, directly or through other nodes.
    #[error("dependency cycle detected at node {node}")]
    Cycle {
        /// The node that was read while already evaluating.
        node: NodeId,
    },

    /// A user computation or effect failed.
    #[error("reactive callback failed: {0}")]
    Callback(#[source] BoxError),

    /// Effects kept re-queuing each other.
    #[error("flush did not settle after {passes} passes")]
    FlushLimit {
        /// Passes run before giving up.
        passes: usize,
    },
}

impl ReactiveError {
    /// Wrap a user error.
    ///
    /// A `ReactiveError` coming back out of a nested read is passed
    /// through as-is rather than wrapped a second time.
    pub fn callback<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        match err.into().downcast::<ReactiveError>() {
            Ok(inner) => *inner,
            Err(other) => ReactiveError::Callback(other),
        }
    }

    /// Whether this is a dependency cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, ReactiveError::Cycle { .. })
    }
}

/// Errors loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document did not parse.
    #[error("invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field parsed but holds an unusable value.
    #[error("invalid runtime config: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
