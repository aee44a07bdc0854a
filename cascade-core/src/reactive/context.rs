//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can record it as a source of the current computation.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When a computed or effect starts evaluating, we push an entry; when it
//! completes, we pop it and hand the collected sources to the edge store.
//!
//! Nested evaluations (a computed read from inside an effect, which reads
//! another computed, ...) each get their own entry, so an inner evaluation
//! never clobbers the outer one's bookkeeping. The guard pops its entry on
//! drop, including on unwind.
//!
//! An entry without a target is an untracked scope: reads inside it are
//! not recorded anywhere.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::{Edge, NodeId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The node being evaluated, or `None` for an untracked scope.
    target: Option<NodeId>,
    /// Sources read so far during this evaluation, first read wins.
    sources: SmallVec<[Edge; 4]>,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub(crate) struct ReactiveContext {
    target: Option<NodeId>,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given node.
    pub fn enter(target: NodeId) -> Self {
        Self::push(Some(target))
    }

    /// Enter a scope in which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(target: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                target,
                sources: SmallVec::new(),
            });
        });

        Self {
            target,
            finished: false,
        }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_target().is_some()
    }

    /// Get the node currently being evaluated, if reads are tracked.
    pub fn current_target() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.target))
    }

    /// Record a read of `source` at `version`.
    ///
    /// Returns the current target when this is the first read of `source`
    /// in the current evaluation, so the caller can subscribe the edge.
    pub fn track(source: NodeId, version: u64) -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let target = entry.target?;

            if entry.sources.iter().any(|edge| edge.source == source) {
                return None;
            }
            entry.sources.push(Edge { source, version });
            Some(target)
        })
    }

    /// Leave the context and return the sources it collected.
    pub fn finish(mut self) -> SmallVec<[Edge; 4]> {
        self.finished = true;
        self.pop().map(|entry| entry.sources).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        CONTEXT_STACK
            .try_with(|stack| {
                let popped = stack.borrow_mut().pop();

                // Verify we're popping the right context.
                // This helps catch bugs where contexts are mismatched.
                if let Some(entry) = &popped {
                    debug_assert_eq!(
                        entry.target, self.target,
                        "ReactiveContext mismatch: expected {:?}, got {:?}",
                        self.target, entry.target
                    );
                }
                popped
            })
            .ok()
            .flatten()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Run `f` without tracking any reads it performs.
///
/// Inside a computed or effect, signals read by `f` do not become
/// dependencies.
///
/// ```rust,ignore
/// let a = signal(1);
/// let b = signal(2);
/// effect(move || {
///     let _ = a.get();                    // tracked
///     let _ = untracked(|| b.get());      // not tracked
/// });
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut arena: SlotMap<NodeId, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn context_tracks_target() {
        let id = ids(1)[0];

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_target().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_target(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_target().is_none());
    }

    #[test]
    fn context_records_first_read_only() {
        let ids = ids(3);
        let ctx = ReactiveContext::enter(ids[0]);

        assert_eq!(ReactiveContext::track(ids[1], 4), Some(ids[0]));
        assert_eq!(ReactiveContext::track(ids[2], 1), Some(ids[0]));
        assert_eq!(ReactiveContext::track(ids[1], 5), None);

        let sources = ctx.finish();
        assert_eq!(
            sources.as_slice(),
            &[
                Edge { source: ids[1], version: 4 },
                Edge { source: ids[2], version: 1 },
            ]
        );
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts() {
        let ids = ids(2);

        {
            let _ctx1 = ReactiveContext::enter(ids[0]);
            assert_eq!(ReactiveContext::current_target(), Some(ids[0]));

            {
                let _ctx2 = ReactiveContext::enter(ids[1]);
                assert_eq!(ReactiveContext::current_target(), Some(ids[1]));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_target(), Some(ids[0]));
        }

        assert!(ReactiveContext::current_target().is_none());
    }

    #[test]
    fn untracked_scope_hides_outer_target() {
        let ids = ids(2);
        let _ctx = ReactiveContext::enter(ids[0]);

        untracked(|| {
            assert!(!ReactiveContext::is_active());
            assert_eq!(ReactiveContext::track(ids[1], 0), None);
        });

        assert_eq!(ReactiveContext::current_target(), Some(ids[0]));
    }

    #[test]
    fn context_is_popped_on_unwind() {
        let id = ids(1)[0];

        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(id);
            panic!("boom");
        });

        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
    }
}
