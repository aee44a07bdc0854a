//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and effects.
//! These primitives form the foundation of Cascade's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the read is
//! recorded as a dependency. When the signal's value changes, all dependents
//! are marked and effects among them re-run.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and only when someone asks for the value.
//! Computeds are useful for expensive computations that should not be repeated
//! unnecessarily.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems,
//! such as updating a view or logging.
//!
//! ## Batches
//!
//! Writes inside [`batch`] are applied immediately, but effects they reach
//! run once, after the outermost batch closes.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, record the read together with the version
//! of the signal it saw.
//!
//! Freshness is decided by comparing those recorded versions, never by
//! pushing values: a write only marks, reads pull.

mod any;
mod batch;
mod computed;
mod context;
mod effect;
mod options;
mod runtime;
mod signal;
mod subscriber;

pub use any::AnySignal;
pub use batch::{batch, try_batch};
pub use computed::{computed, Computed, ComputedState};
pub use context::untracked;
pub use effect::{effect, try_effect, Cleanup, Effect, EffectOutput};
pub use options::{EffectOptions, SignalOptions};
pub use runtime::Runtime;
pub use signal::{signal, Signal};

pub(crate) use effect::EffectInner;
pub(crate) use runtime::Reactive;
