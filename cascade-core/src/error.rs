//! Error types for the reactive engine.
//!
//! Every failure the engine can surface is a [`ReactiveError`]. Errors raised
//! inside a computed are cached on that node and handed to every reader until
//! a real recomputation succeeds, so the enum is `Clone`.

use std::any::Any;

use thiserror::Error;

/// Errors produced while reading, writing or running reactive nodes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A node's evaluation required its own, not yet final, value.
    #[error("cycle detected{}", describe(.name))]
    CycleDetected {
        /// Debug name of the node where the cycle was noticed.
        name: Option<String>,
    },

    /// A write was attempted on a computed signal.
    #[error("cannot write to computed signal{}: computed signals are read-only", describe(.name))]
    ReadOnlyViolation {
        /// Debug name of the computed.
        name: Option<String>,
    },

    /// A user callback (compute function, effect, cleanup or listener) failed.
    #[error("callback failed: {0}")]
    Callback(String),

    /// Several effects failed while one batch was flushed.
    #[error("{} effects failed during flush", .0.len())]
    Effects(Vec<ReactiveError>),
}

fn describe(name: &Option<String>) -> String {
    match name {
        Some(name) => format!(" in `{name}`"),
        None => String::new(),
    }
}

impl ReactiveError {
    /// Wrap any displayable failure from user code.
    pub fn callback(err: impl std::fmt::Display) -> Self {
        Self::Callback(err.to_string())
    }

    /// Whether this error is (or contains) a cycle.
    pub fn is_cycle(&self) -> bool {
        match self {
            Self::CycleDetected { .. } => true,
            Self::Effects(errors) => errors.iter().any(Self::is_cycle),
            _ => false,
        }
    }

    /// Merge the failures of one flush into a single error.
    pub(crate) fn collect(mut errors: Vec<ReactiveError>) -> Result<(), ReactiveError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Effects(errors)),
        }
    }

    /// Recover an error from a caught panic payload.
    ///
    /// Panics raised by the non-`try` accessors carry a `ReactiveError`
    /// payload and come back unchanged; anything else becomes `Callback`.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<ReactiveError>() {
            Ok(err) => *err,
            Err(payload) => {
                if let Some(msg) = payload.downcast_ref::<&'static str>() {
                    Self::Callback((*msg).to_string())
                } else if let Some(msg) = payload.downcast_ref::<String>() {
                    Self::Callback(msg.clone())
                } else {
                    Self::Callback("callback panicked".to_string())
                }
            }
        }
    }

    /// Raise this error as a panic.
    ///
    /// The payload is the error itself, so an enclosing evaluator recovers it
    /// intact through [`ReactiveError::from_panic`].
    pub(crate) fn raise(self) -> ! {
        std::panic::panic_any(self)
    }
}
