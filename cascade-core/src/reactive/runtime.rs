//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computed
//! values and effects. It owns the dependency graph and implements the
//! evaluator half of the engine: recording reads, bringing computeds up to
//! date and deciding whether a node has to run again.
//!
//! # How It Works
//!
//! 1. When a node is created, it registers with the runtime and gets a
//!    [`NodeId`] in the graph arena.
//!
//! 2. When a computed or effect reads a node, the runtime records the
//!    dependency together with the version it saw.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Bumps the signal's version and the global write counter
//!    b. Marks reachable computeds as outdated
//!    c. Queues reachable effects on the batch scheduler
//!    d. Computeds are lazy - they re-validate on next access
//!
//! # Thread Safety
//!
//! There is none, by construction. Each thread has its own runtime in
//! thread-local storage and every handle is `!Send`, so a graph can never be
//! touched from two threads. Embedders that need reactivity on several
//! threads get one independent graph per thread.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{Driver, Edge, Graph, Hook, Node, NodeId};

use super::context::ReactiveContext;
use super::effect::EffectInner;

use smallvec::SmallVec;

/// Type-erased view of a computed, used by the graph to bring a source up
/// to date without knowing its value type.
pub(crate) trait Reactive {
    /// Make the cached value current, recomputing only if a source changed.
    ///
    /// Returns `Ok(false)` if the node is in the middle of its own
    /// evaluation. An error reports a hook that failed while the node's
    /// edges changed; the cached value is current even then.
    fn refresh(&self) -> Result<bool, ReactiveError>;
}

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState::default();
}

#[derive(Default)]
struct RuntimeState {
    graph: RefCell<Graph>,
    /// Incremented on every signal write that changes a value.
    global_version: Cell<u64>,
    config: Cell<RuntimeConfig>,
}

/// The per-thread reactive runtime.
///
/// All state lives in thread-local storage; this type only groups the
/// operations on it.
pub struct Runtime;

impl Runtime {
    /// Replace this thread's runtime configuration.
    pub fn configure(config: RuntimeConfig) {
        RUNTIME.with(|rt| rt.config.set(config));
    }

    /// Get this thread's runtime configuration.
    pub fn config() -> RuntimeConfig {
        RUNTIME.with(|rt| rt.config.get())
    }

    /// Number of live nodes (signals, computeds and effects) on this thread.
    pub fn node_count() -> usize {
        Self::with_graph(|graph| graph.node_count())
    }

    /// Get the node currently being evaluated, if any.
    pub fn current_target() -> Option<NodeId> {
        ReactiveContext::current_target()
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    pub(crate) fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
        RUNTIME.with(|rt| f(&mut rt.graph.borrow_mut()))
    }

    pub(crate) fn global_version() -> u64 {
        RUNTIME.with(|rt| rt.global_version.get())
    }

    pub(crate) fn bump_global_version() {
        RUNTIME.with(|rt| rt.global_version.set(rt.global_version.get() + 1));
    }

    /// Register a node with the runtime.
    pub(crate) fn insert(node: Node) -> NodeId {
        let kind = node.kind;
        let id = Self::with_graph(|graph| graph.insert(node));
        tracing::trace!(node = ?id, ?kind, "node created");
        id
    }

    /// Register an effect node, building its driver from the fresh id.
    pub(crate) fn insert_effect(
        name: Option<String>,
        make: impl FnOnce(NodeId) -> Rc<EffectInner>,
    ) -> (NodeId, Rc<EffectInner>) {
        let id = Self::with_graph(|graph| graph.insert_with(|id| Node::effect(name, make(id))));
        tracing::trace!(node = ?id, "effect created");
        let inner = Self::with_graph(|graph| match graph.get(id).map(|node| &node.driver) {
            Some(Driver::Effect(inner)) => Some(inner.clone()),
            _ => None,
        });
        match inner {
            Some(inner) => (id, inner),
            None => unreachable!("effect node {id:?} was just inserted"),
        }
    }

    /// Unregister a node, detaching every edge that involves it.
    ///
    /// Safe to call from `Drop` impls: does nothing once the thread's
    /// runtime is being torn down. Fails only if an `unwatched` hook fired
    /// by the detach fails.
    pub(crate) fn remove(id: NodeId) -> Result<(), ReactiveError> {
        let mut hooks = Vec::new();
        let removed = RUNTIME
            .try_with(|rt| match rt.graph.try_borrow_mut() {
                Ok(mut graph) => graph.remove(id, &mut hooks),
                Err(_) => {
                    tracing::error!(node = ?id, "graph busy while removing node; node leaked");
                    None
                }
            })
            .ok()
            .flatten();

        if removed.is_some() {
            tracing::trace!(node = ?id, "node removed");
        }

        // The node may own closures holding other handles; drop it only
        // after the graph borrow is released.
        drop(removed);
        Self::fire(hooks)
    }

    /// [`remove`](Self::remove) for `Drop` impls, where a failing hook can
    /// only be logged.
    pub(crate) fn release(id: NodeId) {
        if let Err(err) = Self::remove(id) {
            tracing::warn!(node = ?id, error = %err, "hook failed while dropping node");
        }
    }

    /// Run `watched` / `unwatched` hooks outside any evaluation context.
    ///
    /// Every hook runs even if an earlier one fails.
    pub(crate) fn fire(hooks: Vec<Hook>) -> Result<(), ReactiveError> {
        if hooks.is_empty() {
            return Ok(());
        }
        let _ctx = ReactiveContext::untracked();
        let errors: Vec<_> = hooks
            .into_iter()
            .filter_map(|hook| {
                Self::guarded(|| {
                    hook();
                    Ok(())
                })
                .err()
            })
            .collect();
        ReactiveError::collect(errors)
    }

    pub(crate) fn name(id: NodeId) -> Option<String> {
        Self::with_graph(|graph| graph.get(id).and_then(|node| node.name.clone()))
    }

    pub(crate) fn version(id: NodeId) -> Option<u64> {
        Self::with_graph(|graph| graph.get(id).map(|node| node.version))
    }

    pub(crate) fn cycle(id: NodeId) -> ReactiveError {
        let name = Self::name(id);
        tracing::debug!(node = ?id, name = name.as_deref(), "cycle detected");
        ReactiveError::CycleDetected { name }
    }

    /// Record that the current evaluation read `source` at its current
    /// version.
    ///
    /// A tracking target is subscribed right away, so a write to `source`
    /// later in the same evaluation still reaches it. A `watched` hook that
    /// fails here fails the evaluation that made the read.
    pub(crate) fn track(source: NodeId) {
        if !ReactiveContext::is_active() {
            return;
        }
        let version = Self::version(source).unwrap_or_default();
        let Some(target) = ReactiveContext::track(source, version) else {
            return;
        };

        let mut hooks = Vec::new();
        Self::with_graph(|graph| {
            let subscribe = graph
                .get(target)
                .is_some_and(|node| node.tracking && !node.reads(source));
            if subscribe {
                graph.subscribe(source, target, &mut hooks);
            }
        });
        if let Err(err) = Self::fire(hooks) {
            err.raise();
        }
    }

    /// Install the sources collected by one evaluation of `target`.
    pub(crate) fn install_sources(
        target: NodeId,
        sources: SmallVec<[Edge; 4]>,
    ) -> Result<(), ReactiveError> {
        let mut hooks = Vec::new();
        Self::with_graph(|graph| graph.replace_sources(target, sources, &mut hooks));
        Self::fire(hooks)
    }

    /// Bring `id` up to date if it is a computed.
    pub(crate) fn refresh(id: NodeId) -> Result<bool, ReactiveError> {
        let driver = Self::with_graph(|graph| match graph.get(id).map(|node| &node.driver) {
            Some(Driver::Derived(weak)) => weak.upgrade(),
            _ => None,
        });

        match driver {
            Some(node) => node.refresh(),
            None => Ok(true),
        }
    }

    /// Whether any source of `id` changed since `id` last read it.
    ///
    /// Sources are checked in read order and refreshed on the way, so a
    /// computed source that recomputes to an equal value does not count as
    /// a change.
    pub(crate) fn needs_to_recompute(id: NodeId) -> Result<bool, ReactiveError> {
        let sources = Self::with_graph(|graph| {
            graph
                .get(id)
                .map(|node| node.sources.clone())
                .unwrap_or_default()
        });

        for edge in &sources {
            if Self::version(edge.source) != Some(edge.version)
                || !Self::refresh(edge.source)?
                || Self::version(edge.source) != Some(edge.version)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run user code, turning a panic into a [`ReactiveError`].
    pub(crate) fn guarded<R>(
        f: impl FnOnce() -> Result<R, ReactiveError>,
    ) -> Result<R, ReactiveError> {
        panic::catch_unwind(AssertUnwindSafe(f))
            .unwrap_or_else(|payload| Err(ReactiveError::from_panic(payload)))
    }
}

/// Clears a node's `evaluating` flag when dropped, so a node is never left
/// marked busy after its evaluation unwinds.
pub(crate) struct Evaluating(NodeId);

impl Evaluating {
    /// Take over the flag already set on `id`.
    pub fn new(id: NodeId) -> Self {
        Self(id)
    }
}

impl Drop for Evaluating {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| {
            if let Ok(mut graph) = rt.graph.try_borrow_mut() {
                if let Some(node) = graph.get_mut(self.0) {
                    node.evaluating = false;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_registers_and_unregisters() {
        let before = Runtime::node_count();

        let id = Runtime::insert(Node::source(Some("scratch".into())));
        assert_eq!(Runtime::node_count(), before + 1);
        assert_eq!(Runtime::name(id).as_deref(), Some("scratch"));

        assert_eq!(Runtime::remove(id), Ok(()));
        assert_eq!(Runtime::node_count(), before);
        assert!(Runtime::version(id).is_none());
    }

    #[test]
    fn track_outside_context_is_a_no_op() {
        let id = Runtime::insert(Node::source(None));
        Runtime::track(id);
        assert!(Runtime::with_graph(|graph| graph.get(id).unwrap().targets.is_empty()));
        Runtime::release(id);
    }

    #[test]
    fn guarded_converts_panics() {
        let result: Result<(), _> = Runtime::guarded(|| panic!("exploded"));
        assert_eq!(result, Err(ReactiveError::Callback("exploded".into())));

        let ok = Runtime::guarded(|| Ok(7));
        assert_eq!(ok, Ok(7));
    }

    #[test]
    fn failing_hooks_do_not_stop_the_others() {
        let ran = Rc::new(Cell::new(0));
        let (first, second) = (ran.clone(), ran.clone());
        let hooks: Vec<Hook> = vec![
            Rc::new(|| panic!("first hook")) as Hook,
            Rc::new(move || first.set(first.get() + 1)),
            Rc::new(|| panic!("last hook")),
            Rc::new(move || second.set(second.get() + 1)),
        ];

        let err = Runtime::fire(hooks).unwrap_err();
        assert!(matches!(err, ReactiveError::Effects(ref errs) if errs.len() == 2));
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn evaluating_flag_is_cleared_on_unwind() {
        let id = Runtime::insert(Node::source(None));
        Runtime::with_graph(|graph| graph.get_mut(id).unwrap().evaluating = true);

        let unwound = panic::catch_unwind(|| {
            let _evaluating = Evaluating::new(id);
            panic!("mid-evaluation");
        });
        assert!(unwound.is_err());
        assert!(Runtime::with_graph(|graph| !graph.get(id).unwrap().evaluating));
        Runtime::release(id);
    }

    #[test]
    fn configuration_is_per_thread() {
        Runtime::configure(RuntimeConfig::default().with_max_flush_iterations(3));
        assert_eq!(Runtime::config().max_flush_iterations, 3);

        let other = std::thread::spawn(|| Runtime::config().max_flush_iterations)
            .join()
            .unwrap();
        assert_eq!(other, RuntimeConfig::DEFAULT_MAX_FLUSH_ITERATIONS);
    }
}
