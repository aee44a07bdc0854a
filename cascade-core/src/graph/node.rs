//! Graph Nodes
//!
//! This module defines the record shared by signals, computed values and
//! effects, plus the edge type linking a target to each source it read.

use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::reactive::{EffectInner, Reactive};

new_key_type! {
    /// Unique identifier for a node in the dependency graph.
    ///
    /// Keys are generational: a stale id never resolves to a node that
    /// later reused the same slot.
    pub struct NodeId;
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A writable signal. Roots of the graph: no sources, only targets.
    Source,

    /// A computed value. Has sources, and targets while it is observed.
    Derived,

    /// An effect. Has sources but never targets.
    Effect,
}

/// A dependency edge as seen from its target.
///
/// `version` is the source's version at the time the target last read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Edge {
    pub source: NodeId,
    pub version: u64,
}

/// Callback fired when a node gains its first or loses its last target.
pub(crate) type Hook = Rc<dyn Fn()>;

/// How the graph reaches the typed half of a node.
pub(crate) enum Driver {
    /// Signals never need to be brought up to date.
    Source,

    /// Held weakly: a computed lives only as long as some handle to it.
    Derived(Weak<dyn Reactive>),

    /// Held strongly: an effect lives until it is disposed.
    Effect(Rc<EffectInner>),
}

/// A node in the dependency graph.
pub(crate) struct Node {
    pub kind: NodeKind,
    pub name: Option<String>,

    /// Incremented whenever the node's value changes; never decremented.
    /// Zero on a computed means it has not been evaluated yet.
    pub version: u64,

    /// Global write counter observed at the last refresh, if any.
    pub global_version: Option<u64>,

    /// Currently running its compute function or effect callback.
    pub evaluating: bool,

    /// Already reached by the current propagation pass.
    pub notified: bool,

    /// Some source may have changed since the last refresh.
    pub outdated: bool,

    /// Subscribed to its own sources. Always set for effects; set for a
    /// computed only while it has at least one target.
    pub tracking: bool,

    /// Effect marked for disposal.
    pub disposed: bool,

    /// Sources read during the last evaluation, in read order.
    pub sources: SmallVec<[Edge; 4]>,

    /// Nodes subscribed to this one, in subscription order.
    pub targets: IndexSet<NodeId>,

    pub driver: Driver,
    pub watched: Option<Hook>,
    pub unwatched: Option<Hook>,
}

impl Node {
    fn new(kind: NodeKind, driver: Driver, name: Option<String>) -> Self {
        Self {
            kind,
            name,
            version: 0,
            global_version: None,
            evaluating: false,
            notified: false,
            outdated: false,
            tracking: kind == NodeKind::Effect,
            disposed: false,
            sources: SmallVec::new(),
            targets: IndexSet::new(),
            driver,
            watched: None,
            unwatched: None,
        }
    }

    /// Create a new source (signal) node.
    pub fn source(name: Option<String>) -> Self {
        Self::new(NodeKind::Source, Driver::Source, name)
    }

    /// Create a new derived (computed) node.
    pub fn derived(name: Option<String>, driver: Weak<dyn Reactive>) -> Self {
        Self::new(NodeKind::Derived, Driver::Derived(driver), name)
    }

    /// Create a new effect node.
    pub fn effect(name: Option<String>, driver: Rc<EffectInner>) -> Self {
        Self::new(NodeKind::Effect, Driver::Effect(driver), name)
    }

    pub fn with_hooks(mut self, watched: Option<Hook>, unwatched: Option<Hook>) -> Self {
        self.watched = watched;
        self.unwatched = unwatched;
        self
    }

    /// Whether `source` was read during the last evaluation.
    pub fn reads(&self, source: NodeId) -> bool {
        self.sources.iter().any(|edge| edge.source == source)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tracking", &self.tracking)
            .field("sources", &self.sources.len())
            .field("targets", &self.targets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn source_node_starts_inactive() {
        let node = Node::source(Some("count".into()));
        assert_eq!(node.kind, NodeKind::Source);
        assert_eq!(node.version, 0);
        assert!(!node.tracking);
        assert!(node.targets.is_empty());
    }

    #[test]
    fn reads_checks_recorded_sources() {
        let mut ids: SlotMap<NodeId, ()> = SlotMap::with_key();
        let a = ids.insert(());
        let b = ids.insert(());

        let mut node = Node::source(None);
        node.sources.push(Edge { source: a, version: 3 });

        assert!(node.reads(a));
        assert!(!node.reads(b));
    }

    #[test]
    fn removed_ids_do_not_resolve() {
        let mut ids: SlotMap<NodeId, u32> = SlotMap::with_key();
        let first = ids.insert(1);
        ids.remove(first);
        let second = ids.insert(2);

        assert_ne!(first, second);
        assert!(ids.get(first).is_none());
    }
}
