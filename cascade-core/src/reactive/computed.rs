//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Nothing runs at construction. On first access, the computed runs its
//!    function and caches the result.
//!
//! 2. When accessed again and no signal anywhere was written since, the
//!    cached value is returned straight away.
//!
//! 3. Otherwise each recorded source is checked in read order, refreshing
//!    computed sources on the way. Only if some source really changed does
//!    the function run again.
//!
//! 4. A recomputation that produces an equal value keeps the old version,
//!    so dependents of this computed do not re-run either.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually accessed will recompute
//! - Computeds that are never read stay outdated (no wasted work)
//!
//! # Activation
//!
//! A computed only subscribes to its sources while something (an effect, or
//! another active computed) is subscribed to it. An unobserved computed
//! holds no edges in its sources and is removed as soon as its last handle
//! drops; it re-validates by version on every read instead.
//!
//! # Errors
//!
//! If the function fails (returns `Err` or panics), the error is cached
//! like a value and handed to every reader until a recomputation succeeds.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::ReactiveError;
use crate::graph::{Node, NodeId};

use super::context::{untracked, ReactiveContext};
use super::effect::Effect;
use super::options::SignalOptions;
use super::runtime::{Evaluating, Reactive, Runtime};
use super::subscriber;

/// Freshness of a computed's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// Never evaluated.
    Uninitialized,

    /// The cached value is up to date.
    Valid,

    /// A source might have changed. The next read re-validates.
    Stale,

    /// The function is running right now.
    Evaluating,
}

type ComputeFn<T> = Box<dyn Fn() -> Result<T, ReactiveError>>;

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some computeds might return the same value even if inputs changed).
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    id: NodeId,
    compute: ComputeFn<T>,
    /// `None` until the first evaluation.
    value: RefCell<Option<Result<T, ReactiveError>>>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::release(self.id);
    }
}

/// Stack left when a refresh grows the stack before recursing further.
const STACK_RED_ZONE: usize = 64 * 1024;

/// Size of each stack segment allocated for deep chains.
const STACK_SEGMENT: usize = 1024 * 1024;

/// What `refresh` has to do after inspecting the node.
#[derive(Clone, Copy)]
enum Step {
    Busy,
    Current,
    Validate,
    Evaluate,
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Run the function and store its result.
    ///
    /// The version is bumped unless the new value equals the cached one.
    /// Errors always count as a change. Fails if a hook fired by the edge
    /// update fails; the new value is stored regardless.
    fn recompute(&self) -> Result<(), ReactiveError> {
        let id = self.id;
        tracing::trace!(node = ?id, "recomputing");

        let ctx = ReactiveContext::enter(id);
        let result = Runtime::guarded(|| (self.compute)());
        let sources = ctx.finish();
        let hooks = Runtime::install_sources(id, sources);

        let changed = match (&*self.value.borrow(), &result) {
            (Some(Ok(old)), Ok(new)) => old != new,
            _ => true,
        };

        // Old value is dropped after the node is updated.
        let previous = changed.then(|| self.value.replace(Some(result)));
        if changed {
            Runtime::with_graph(|graph| {
                if let Some(node) = graph.get_mut(id) {
                    node.version += 1;
                }
            });
        }
        drop(previous);
        hooks
    }

    fn refresh_in_place(&self) -> Result<bool, ReactiveError> {
        let global = Runtime::global_version();
        let step = Runtime::with_graph(|graph| {
            let Some(node) = graph.get_mut(self.id) else {
                return Step::Current;
            };
            node.notified = false;
            if node.evaluating {
                return Step::Busy;
            }
            // Subscribed and not reached by any write since the last refresh.
            if node.tracking && !node.outdated {
                return Step::Current;
            }
            node.outdated = false;
            // No signal anywhere has been written since the last refresh.
            if node.global_version == Some(global) {
                return Step::Current;
            }
            node.global_version = Some(global);
            node.evaluating = true;
            if node.version > 0 {
                Step::Validate
            } else {
                Step::Evaluate
            }
        });

        match step {
            Step::Busy => return Ok(false),
            Step::Current => return Ok(true),
            Step::Validate | Step::Evaluate => {}
        }
        let _evaluating = Evaluating::new(self.id);

        // A source that failed to refresh cleanly still has a current value,
        // so recompute and report the failure afterwards.
        let validation = match step {
            Step::Validate => match Runtime::needs_to_recompute(self.id) {
                Ok(false) => return Ok(true),
                Ok(true) => Ok(()),
                Err(err) => Err(err),
            },
            _ => Ok(()),
        };

        let hooks = self.recompute();
        let errors: Vec<_> = [validation, hooks]
            .into_iter()
            .filter_map(Result::err)
            .collect();
        ReactiveError::collect(errors).map(|()| true)
    }
}

impl<T> Reactive for ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn refresh(&self) -> Result<bool, ReactiveError> {
        // Chains of computeds refresh recursively, one level per link.
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.refresh_in_place())
    }
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new computed with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self::try_new(move || Ok(compute()))
    }

    /// Create a computed whose function may fail.
    pub fn try_new(compute: impl Fn() -> Result<T, ReactiveError> + 'static) -> Self {
        Self::try_with_options(SignalOptions::default(), compute)
    }

    /// Create a computed with a debug name and/or watch hooks.
    pub fn with_options(
        options: impl Into<SignalOptions>,
        compute: impl Fn() -> T + 'static,
    ) -> Self {
        Self::try_with_options(options, move || Ok(compute()))
    }

    /// Create a computed whose function may fail, with options.
    pub fn try_with_options(
        options: impl Into<SignalOptions>,
        compute: impl Fn() -> Result<T, ReactiveError> + 'static,
    ) -> Self {
        let options = options.into();
        let compute: ComputeFn<T> = Box::new(compute);

        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let driver: Weak<dyn Reactive> = weak.clone();
            let node = Node::derived(options.name, driver)
                .with_hooks(options.watched, options.unwatched);
            ComputedInner {
                id: Runtime::insert(node),
                compute,
                value: RefCell::new(None),
            }
        });

        Self { inner }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the computed's debug name, if it was given one.
    pub fn name(&self) -> Option<String> {
        Runtime::name(self.inner.id)
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Panics with the [`ReactiveError`] on a cycle or if the function
    /// failed; see [`try_get`](Self::try_get).
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| err.raise())
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a computed's value. Inside a
    /// reactive context the read is recorded as a dependency.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        let id = self.inner.id;
        let evaluating =
            Runtime::with_graph(|graph| graph.get(id).is_some_and(|node| node.evaluating));
        if evaluating {
            return Err(Runtime::cycle(id));
        }

        // Track even if a hook failed, so the reader keeps its edge.
        let refreshed = self.inner.refresh();
        Runtime::track(id);
        refreshed?;

        match &*self.inner.value.borrow() {
            Some(result) => result.clone(),
            None => Err(Runtime::cycle(id)),
        }
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.try_peek().unwrap_or_else(|err| err.raise())
    }

    /// Fallible form of [`peek`](Self::peek).
    pub fn try_peek(&self) -> Result<T, ReactiveError> {
        untracked(|| self.try_get())
    }

    /// Call `listener` with the current value now and after every change.
    ///
    /// The listener runs untracked; dispose the returned [`Effect`] to stop.
    pub fn subscribe(&self, listener: impl Fn(T) + 'static) -> Effect {
        self.try_subscribe(listener).unwrap_or_else(|err| err.raise())
    }

    /// Fallible form of [`subscribe`](Self::subscribe).
    pub fn try_subscribe(&self, listener: impl Fn(T) + 'static) -> Result<Effect, ReactiveError> {
        let this = self.clone();
        subscriber::subscribe(move || this.try_get(), listener)
    }

    /// Number of times the cached value has changed.
    pub fn version(&self) -> u64 {
        Runtime::version(self.inner.id).unwrap_or_default()
    }

    /// Number of computeds and effects currently subscribed to this one.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with_graph(|graph| graph.get(self.inner.id).map_or(0, |node| node.targets.len()))
    }

    /// Whether the computed is subscribed to its own sources.
    pub fn is_active(&self) -> bool {
        Runtime::with_graph(|graph| graph.get(self.inner.id).is_some_and(|node| node.tracking))
    }

    /// Get the current freshness state without refreshing.
    ///
    /// An inactive computed is reported `Stale` after any write, since it
    /// cannot know which signals were written until it re-validates.
    pub fn state(&self) -> ComputedState {
        let global = Runtime::global_version();
        Runtime::with_graph(|graph| {
            let Some(node) = graph.get(self.inner.id) else {
                return ComputedState::Uninitialized;
            };
            if node.evaluating {
                ComputedState::Evaluating
            } else if node.version == 0 {
                ComputedState::Uninitialized
            } else if node.outdated
                || node.notified
                || (!node.tracking && node.global_version != Some(global))
            {
                ComputedState::Stale
            } else {
                ComputedState::Valid
            }
        })
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Computed<T>
where
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Formats the current value, or the error the function failed with.
impl<T> fmt::Display for Computed<T>
where
    T: Clone + PartialEq + fmt::Display + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_get() {
            Ok(value) => fmt::Display::fmt(&value, f),
            Err(err) => fmt::Display::fmt(&err, f),
        }
    }
}

#[cfg(feature = "serde")]
impl<T> serde::Serialize for Computed<T>
where
    T: Clone + PartialEq + serde::Serialize + 'static,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.try_peek() {
            Ok(value) => value.serialize(serializer),
            Err(err) => Err(serde::ser::Error::custom(err)),
        }
    }
}

/// Create a new computed. Shorthand for [`Computed::new`].
pub fn computed<T: Clone + PartialEq + 'static>(f: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::reactive::Signal;

    #[test]
    fn computed_computes_on_first_access() {
        let call_count = Rc::new(Cell::new(0));
        let calls = call_count.clone();

        let computed = Computed::new(move || {
            calls.set(calls.get() + 1);
            42
        });

        // Not computed yet
        assert_eq!(computed.state(), ComputedState::Uninitialized);
        assert_eq!(call_count.get(), 0);

        // First access triggers computation
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.get(), 1);
        assert_eq!(computed.version(), 1);
    }

    #[test]
    fn computed_caches_value_until_source_changes() {
        let source = Signal::new(1);
        let call_count = Rc::new(Cell::new(0));

        let (calls, read) = (call_count.clone(), source.clone());
        let computed = Computed::new(move || {
            calls.set(calls.get() + 1);
            read.get() * 2
        });

        assert_eq!(computed.get(), 2);
        assert_eq!(computed.get(), 2);
        assert_eq!(call_count.get(), 1);

        source.set(5);
        assert_eq!(computed.state(), ComputedState::Stale);
        assert_eq!(computed.get(), 10);
        assert_eq!(call_count.get(), 2);
        assert_eq!(computed.state(), ComputedState::Valid);
    }

    #[test]
    fn unrelated_write_only_revalidates() {
        let source = Signal::new(1);
        let unrelated = Signal::new(0);
        let call_count = Rc::new(Cell::new(0));

        let (calls, read) = (call_count.clone(), source.clone());
        let computed = Computed::new(move || {
            calls.set(calls.get() + 1);
            read.get()
        });

        assert_eq!(computed.get(), 1);
        unrelated.set(1);
        assert_eq!(computed.get(), 1);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn equal_result_keeps_version() {
        let source = Signal::new(2);
        let read = source.clone();
        let parity = Computed::new(move || read.get() % 2);

        assert_eq!(parity.get(), 0);
        assert_eq!(parity.version(), 1);

        source.set(4);
        assert_eq!(parity.get(), 0);
        assert_eq!(parity.version(), 1);
    }

    #[test]
    fn errors_are_cached() {
        let call_count = Rc::new(Cell::new(0));
        let calls = call_count.clone();
        let failing: Computed<i32> = Computed::try_new(move || {
            calls.set(calls.get() + 1);
            Err(ReactiveError::callback("bad input"))
        });

        let expected = Err(ReactiveError::Callback("bad input".into()));
        assert_eq!(failing.try_get(), expected);
        assert_eq!(failing.try_get(), expected);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn panics_are_cached_as_errors() {
        let failing: Computed<i32> = Computed::new(|| panic!("kaboom"));
        assert_eq!(
            failing.try_get(),
            Err(ReactiveError::Callback("kaboom".into()))
        );
    }

    #[test]
    fn computed_clone_shares_state() {
        let computed1 = Computed::new(|| 42);
        assert_eq!(computed1.get(), 42);

        let computed2 = computed1.clone();

        // Clone should have same ID and share state
        assert_eq!(computed1.id(), computed2.id());
        assert_eq!(computed2.state(), ComputedState::Valid);
        assert_eq!(computed2.get(), 42);
    }

    #[test]
    fn unobserved_computed_stays_inactive() {
        let source = Signal::new(1);
        let read = source.clone();
        let computed = Computed::new(move || read.get());

        assert_eq!(computed.get(), 1);
        assert!(!computed.is_active());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn dropping_computed_removes_node() {
        let before = Runtime::node_count();
        let computed = Computed::new(|| 1);
        assert_eq!(computed.get(), 1);
        assert_eq!(Runtime::node_count(), before + 1);

        drop(computed);
        assert_eq!(Runtime::node_count(), before);
    }

    #[test]
    fn display_shows_value_or_error() {
        let ok = Computed::new(|| 7);
        assert_eq!(ok.to_string(), "7");

        let failing: Computed<i32> =
            Computed::try_new(|| Err(ReactiveError::callback("no value")));
        assert_eq!(failing.to_string(), "callback failed: no value");
    }
}
