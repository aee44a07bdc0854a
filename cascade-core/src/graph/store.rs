//! Dependency Edge Store
//!
//! The store owns every node of one thread's graph in a generational arena
//! and keeps both directions of each edge in sync: a target lists its
//! sources (with the version it observed), a source lists the targets
//! subscribed to it.
//!
//! # Lazy activation
//!
//! A computed only subscribes to its own sources while something is
//! subscribed to it. Gaining the first target activates it (it subscribes
//! upward, recursively); losing the last target deactivates it (it
//! unsubscribes upward, recursively). An unobserved computed therefore holds
//! no edges in its sources' target sets and can be dropped freely.
//!
//! User hooks (`watched` / `unwatched`) fired by these transitions are
//! collected into a caller-provided buffer instead of being invoked, because
//! the store is always mutably borrowed while it runs.

use slotmap::SlotMap;
use smallvec::SmallVec;

use super::node::{Edge, Hook, Node, NodeId, NodeKind};

/// The per-thread node arena and edge store.
pub(crate) struct Graph {
    nodes: SlotMap<NodeId, Node>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    /// Add a node to the graph.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Add a node whose contents need to know its own id.
    pub fn insert_with(&mut self, f: impl FnOnce(NodeId) -> Node) -> NodeId {
        self.nodes.insert_with_key(f)
    }

    /// Get a reference to a node.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a mutable reference to a node.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Subscribe `target` to `source`.
    ///
    /// If `source` is a computed receiving its first target it becomes
    /// tracking and subscribes to its own sources in turn.
    pub fn subscribe(&mut self, source: NodeId, target: NodeId, hooks: &mut Vec<Hook>) {
        let mut pending = vec![(source, target)];

        while let Some((source, target)) = pending.pop() {
            let Some(node) = self.nodes.get_mut(source) else {
                continue;
            };

            let first = node.targets.is_empty();
            if !node.targets.insert(target) || !first {
                continue;
            }

            if let Some(hook) = &node.watched {
                hooks.push(hook.clone());
            }

            if node.kind == NodeKind::Derived {
                node.tracking = true;
                // Nothing told us about writes while we were not subscribed.
                node.outdated = true;
                for edge in &node.sources {
                    pending.push((edge.source, source));
                }
            }
        }
    }

    /// Unsubscribe `target` from `source`.
    ///
    /// If `source` is a computed losing its last target it stops tracking
    /// and unsubscribes from its own sources in turn.
    pub fn unsubscribe(&mut self, source: NodeId, target: NodeId, hooks: &mut Vec<Hook>) {
        let mut pending = vec![(source, target)];

        while let Some((source, target)) = pending.pop() {
            let Some(node) = self.nodes.get_mut(source) else {
                continue;
            };

            if !node.targets.shift_remove(&target) || !node.targets.is_empty() {
                continue;
            }

            if let Some(hook) = &node.unwatched {
                hooks.push(hook.clone());
            }

            if node.kind == NodeKind::Derived {
                node.tracking = false;
                for edge in &node.sources {
                    pending.push((edge.source, source));
                }
            }
        }
    }

    /// Install the sources recorded during an evaluation of `target`.
    ///
    /// Edges from the previous evaluation that were not read again are
    /// dropped, and unsubscribed if the target is tracking. New edges were
    /// already subscribed at read time.
    pub fn replace_sources(
        &mut self,
        target: NodeId,
        sources: SmallVec<[Edge; 4]>,
        hooks: &mut Vec<Hook>,
    ) {
        let Some(node) = self.nodes.get_mut(target) else {
            return;
        };

        let old = std::mem::replace(&mut node.sources, sources);
        if !node.tracking {
            return;
        }

        let stale: SmallVec<[NodeId; 4]> = old
            .iter()
            .map(|edge| edge.source)
            .filter(|source| !node.reads(*source))
            .collect();

        for source in stale {
            self.unsubscribe(source, target, hooks);
        }
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. The node is handed back
    /// so the caller can drop it once the graph is no longer borrowed.
    pub fn remove(&mut self, id: NodeId, hooks: &mut Vec<Hook>) -> Option<Node> {
        let node = self.nodes.remove(id)?;

        // Remove this node from its sources' target sets
        if node.tracking {
            for edge in &node.sources {
                self.unsubscribe(edge.source, id, hooks);
            }
        }

        // Remove this node from its targets' source lists
        for target in &node.targets {
            if let Some(dependent) = self.nodes.get_mut(*target) {
                dependent.sources.retain(|edge| edge.source != id);
            }
        }

        Some(node)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    use crate::error::ReactiveError;
    use crate::reactive::Reactive;

    struct Inert;

    impl Reactive for Inert {
        fn refresh(&self) -> Result<bool, ReactiveError> {
            Ok(true)
        }
    }

    fn derived() -> Node {
        let weak: Weak<dyn Reactive> = Weak::<Inert>::new();
        Node::derived(None, weak)
    }

    /// Build `source -> derived` with the edge recorded but not subscribed.
    fn chain(graph: &mut Graph) -> (NodeId, NodeId) {
        let source = graph.insert(Node::source(None));
        let derived = graph.insert(derived());
        graph
            .get_mut(derived)
            .unwrap()
            .sources
            .push(Edge { source, version: 0 });
        (source, derived)
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = Graph::new();
        let mut hooks = Vec::new();

        let id1 = graph.insert(Node::source(None));
        let id2 = graph.insert(derived());
        assert_eq!(graph.node_count(), 2);

        assert!(graph.remove(id1, &mut hooks).is_some());
        assert_eq!(graph.node_count(), 1);
        assert!(graph.get(id1).is_none());
        assert!(graph.get(id2).is_some());
    }

    #[test]
    fn first_target_activates_derived_node() {
        let mut graph = Graph::new();
        let mut hooks = Vec::new();
        let (source, derived) = chain(&mut graph);
        let sink = graph.insert(Node::source(None));

        // Recorded but inactive: the source knows nothing about it.
        assert!(graph.get(source).unwrap().targets.is_empty());

        graph.subscribe(derived, sink, &mut hooks);

        let node = graph.get(derived).unwrap();
        assert!(node.tracking);
        assert!(node.outdated);
        assert!(graph.get(source).unwrap().targets.contains(&derived));
    }

    #[test]
    fn last_target_deactivates_derived_node() {
        let mut graph = Graph::new();
        let mut hooks = Vec::new();
        let (source, derived) = chain(&mut graph);
        let sink_a = graph.insert(Node::source(None));
        let sink_b = graph.insert(Node::source(None));

        graph.subscribe(derived, sink_a, &mut hooks);
        graph.subscribe(derived, sink_b, &mut hooks);

        graph.unsubscribe(derived, sink_a, &mut hooks);
        assert!(graph.get(derived).unwrap().tracking);

        graph.unsubscribe(derived, sink_b, &mut hooks);
        assert!(!graph.get(derived).unwrap().tracking);
        assert!(graph.get(source).unwrap().targets.is_empty());
    }

    #[test]
    fn hooks_fire_on_first_and_last_subscription() {
        let mut graph = Graph::new();
        let mut hooks = Vec::new();

        let watched = Rc::new(Cell::new(0));
        let unwatched = Rc::new(Cell::new(0));
        let (w, u) = (watched.clone(), unwatched.clone());
        let source = graph.insert(Node::source(None).with_hooks(
            Some(Rc::new(move || w.set(w.get() + 1))),
            Some(Rc::new(move || u.set(u.get() + 1))),
        ));
        let a = graph.insert(Node::source(None));
        let b = graph.insert(Node::source(None));

        graph.subscribe(source, a, &mut hooks);
        graph.subscribe(source, b, &mut hooks);
        assert_eq!(hooks.len(), 1);
        hooks.drain(..).for_each(|hook| hook());

        graph.unsubscribe(source, a, &mut hooks);
        assert!(hooks.is_empty());
        graph.unsubscribe(source, b, &mut hooks);
        hooks.drain(..).for_each(|hook| hook());

        assert_eq!(watched.get(), 1);
        assert_eq!(unwatched.get(), 1);
    }

    #[test]
    fn replace_sources_drops_unread_edges() {
        let mut graph = Graph::new();
        let mut hooks = Vec::new();

        let a = graph.insert(Node::source(None));
        let b = graph.insert(Node::source(None));
        let effect = graph.insert(derived());
        graph.get_mut(effect).unwrap().tracking = true;

        graph.get_mut(effect).unwrap().sources.push(Edge { source: a, version: 0 });
        graph.get_mut(effect).unwrap().sources.push(Edge { source: b, version: 0 });
        graph.subscribe(a, effect, &mut hooks);
        graph.subscribe(b, effect, &mut hooks);

        let mut next = SmallVec::new();
        next.push(Edge { source: b, version: 1 });
        graph.replace_sources(effect, next, &mut hooks);

        assert!(graph.get(a).unwrap().targets.is_empty());
        assert!(graph.get(b).unwrap().targets.contains(&effect));
        assert_eq!(graph.get(effect).unwrap().sources.len(), 1);
    }

    #[test]
    fn removing_a_node_detaches_both_directions() {
        let mut graph = Graph::new();
        let mut hooks = Vec::new();
        let (source, derived) = chain(&mut graph);
        let sink = graph.insert(derived_with_source(derived));
        graph.subscribe(derived, sink, &mut hooks);

        graph.remove(derived, &mut hooks);

        assert!(graph.get(source).unwrap().targets.is_empty());
        assert!(graph.get(sink).unwrap().sources.is_empty());
    }

    fn derived_with_source(source: NodeId) -> Node {
        let mut node = derived();
        node.sources.push(Edge { source, version: 0 });
        node
    }
}
