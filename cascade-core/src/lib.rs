//! Cascade Core
//!
//! This crate provides a fine-grained reactive dependency engine.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Dependency tracking with per-edge version stamps
//! - Lazy, memoized re-evaluation with equality bail-out
//! - Batched effect scheduling and cycle detection
//!
//! The engine is single-threaded: every thread gets its own independent
//! graph, and handles cannot be sent between threads.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, evaluation context and batching
//! - `graph`: Node arena, dependency edge store and propagation walk
//! - `config`: Per-thread runtime tunables
//! - `error`: The [`ReactiveError`] type
//!
//! # Example
//!
//! ```rust
//! use cascade_core::{batch, computed, effect, signal};
//!
//! // Create a signal
//! let count = signal(0);
//!
//! // Create a derived value
//! let doubled = computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = effect({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("Count: {}, Doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! // Several writes, one effect run
//! batch(|| {
//!     count.set(6);
//!     count.set(7);
//! });
//!
//! log.dispose();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::ReactiveError;
pub use graph::NodeId;
pub use reactive::{
    batch, computed, effect, signal, try_batch, try_effect, untracked, AnySignal, Cleanup,
    Computed, ComputedState, Effect, EffectOptions, EffectOutput, Runtime, Signal, SignalOptions,
};
