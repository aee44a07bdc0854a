//! Batch Scheduler
//!
//! Effects never run in the middle of a write. Every write opens an
//! implicit batch, marks its dependents and queues the effects it reached;
//! when the outermost batch closes, the queue is flushed.
//!
//! # Flushing
//!
//! The queue is drained in rounds. Each round takes the effects queued so
//! far, in the order they were first reached, and runs each one whose
//! sources actually changed. Effects queued while a round runs (because an
//! effect wrote to a signal) go into the next round. The batch stays open
//! during the flush, so those writes never flush recursively.
//!
//! A write that happens after `max_flush_iterations` rounds is rejected as a
//! cycle: some effect keeps re-triggering itself.
//!
//! One failing effect does not stop the flush; every failure is collected
//! and reported once the queue is empty.

use std::cell::{Cell, RefCell};

use crate::error::ReactiveError;
use crate::graph::{mark_targets, Driver, NodeId};

use super::runtime::Runtime;

thread_local! {
    static BATCH: BatchState = BatchState::default();
}

#[derive(Default)]
struct BatchState {
    /// Number of open batches. Zero means no batch is open.
    depth: Cell<u32>,
    /// Flush rounds completed by the current outermost batch.
    iteration: Cell<u32>,
    /// Effects waiting for the next round.
    queue: RefCell<Vec<NodeId>>,
}

/// Entry points of the batch scheduler.
pub(crate) struct Batch;

impl Batch {
    /// Open a batch. Close it with [`BatchGuard::finish`].
    pub fn start() -> BatchGuard {
        BATCH.with(|batch| batch.depth.set(batch.depth.get() + 1));
        BatchGuard { finished: false }
    }

    /// Flush rounds run so far by the current outermost batch.
    pub fn iteration() -> u32 {
        BATCH.with(|batch| batch.iteration.get())
    }

    /// Mark everything downstream of `source` and queue reached effects.
    pub fn propagate(source: NodeId) {
        let mut effects = Vec::new();
        Runtime::with_graph(|graph| mark_targets(graph, source, &mut effects));
        if !effects.is_empty() {
            BATCH.with(|batch| batch.queue.borrow_mut().extend(effects));
        }
    }

    fn end() -> Result<(), ReactiveError> {
        let depth = BATCH.with(|batch| batch.depth.get());
        if depth > 1 {
            BATCH.with(|batch| batch.depth.set(depth - 1));
            return Ok(());
        }

        let _close = CloseOnDrop;
        Self::flush()
    }

    fn flush() -> Result<(), ReactiveError> {
        let mut errors = Vec::new();

        loop {
            let queue = BATCH.with(|batch| std::mem::take(&mut *batch.queue.borrow_mut()));
            if queue.is_empty() {
                break;
            }

            let iteration = BATCH.with(|batch| {
                batch.iteration.set(batch.iteration.get() + 1);
                batch.iteration.get()
            });
            tracing::trace!(iteration, effects = queue.len(), "flushing effects");

            for id in queue {
                let effect = Runtime::with_graph(|graph| {
                    let node = graph.get_mut(id)?;
                    node.notified = false;
                    if node.disposed {
                        return None;
                    }
                    match &node.driver {
                        Driver::Effect(effect) => Some(effect.clone()),
                        _ => None,
                    }
                });

                // Disposed effects are gone from the graph and never run.
                let Some(effect) = effect else {
                    continue;
                };

                // A source that failed to refresh cleanly still counts as
                // changed: the effect runs and sees its current value.
                let outcome = Runtime::guarded(|| match Runtime::needs_to_recompute(id) {
                    Ok(false) => Ok(()),
                    Ok(true) => effect.run(),
                    Err(err) => {
                        let ran = effect.run();
                        ReactiveError::collect(std::iter::once(err).chain(ran.err()).collect())
                    }
                });

                if let Err(err) = outcome {
                    tracing::warn!(node = ?id, error = %err, "effect failed during flush");
                    errors.push(err);
                }
            }
        }

        ReactiveError::collect(errors)
    }
}

/// Closes the outermost batch even if the flush unwinds.
struct CloseOnDrop;

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let _ = BATCH.try_with(|batch| {
            batch.iteration.set(0);
            batch.depth.set(batch.depth.get().saturating_sub(1));
        });
    }
}

/// An open batch.
///
/// Dropping the guard without calling [`finish`](BatchGuard::finish) (for
/// example while unwinding out of a batch callback) still closes the batch
/// and flushes queued effects; failures found then can only be logged.
#[must_use = "a batch is closed by calling `finish`"]
pub(crate) struct BatchGuard {
    finished: bool,
}

impl BatchGuard {
    /// Close the batch, flushing queued effects if it was the outermost one.
    pub fn finish(mut self) -> Result<(), ReactiveError> {
        self.finished = true;
        Batch::end()
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = Batch::end() {
            tracing::error!(error = %err, "effects failed while unwinding out of a batch");
        }
    }
}

/// Group several writes so that effects run once, after all of them.
///
/// Nested calls are transparent: only the outermost batch flushes. Returns
/// the callback's value, or the error(s) raised by effects during the flush.
/// If the callback panics, queued effects still run before the panic
/// continues.
pub fn try_batch<R>(f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
    let guard = Batch::start();
    let value = f();
    guard.finish()?;
    Ok(value)
}

/// Like [`try_batch`], but panics with the [`ReactiveError`] if an effect
/// fails during the flush.
///
/// ```rust,ignore
/// let a = signal(0);
/// let b = signal(0);
/// effect(move || println!("{}", a.get() + b.get()));
///
/// batch(|| {
///     a.set(1);
///     b.set(2);
/// }); // prints "3" once
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    try_batch(f).unwrap_or_else(|err| err.raise())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_open() -> bool {
        BATCH.with(|batch| batch.depth.get() > 0)
    }

    #[test]
    fn batch_returns_callback_value() {
        assert_eq!(batch(|| 42), 42);
        assert_eq!(try_batch(|| "done"), Ok("done"));
    }

    #[test]
    fn nested_batches_share_one_boundary() {
        assert!(!is_open());
        batch(|| {
            assert!(is_open());
            batch(|| assert!(is_open()));
            assert!(is_open());
        });
        assert!(!is_open());
    }

    #[test]
    fn batch_closes_when_callback_panics() {
        let result = std::panic::catch_unwind(|| batch(|| panic!("inside batch")));
        assert!(result.is_err());
        assert!(!is_open());
        assert_eq!(Batch::iteration(), 0);
    }
}
