//! Change Propagation
//!
//! When a signal is written, every computed reachable through subscribed
//! edges is flagged as outdated and every reachable effect is queued. No
//! value is recomputed here: computeds re-check their recorded source
//! versions lazily on the next read, and queued effects do the same before
//! running. That keeps the write path linear in the number of reachable
//! nodes, each visited once per pass no matter how many paths lead to it.
//!
//! The `notified` bit provides the once-per-pass guarantee. It is cleared
//! when a computed is refreshed or an effect is taken off the queue, so a
//! node already marked and not yet consumed is not walked again by later
//! writes in the same batch.

use smallvec::SmallVec;

use super::node::{NodeId, NodeKind};
use super::store::Graph;

/// Mark everything downstream of `source` and collect newly reached effects.
///
/// Effects are appended to `effects` in the order they are first reached,
/// visiting targets depth-first in subscription order.
pub(crate) fn mark_targets(graph: &mut Graph, source: NodeId, effects: &mut Vec<NodeId>) {
    let mut stack: SmallVec<[NodeId; 8]> = match graph.get(source) {
        Some(node) => node.targets.iter().rev().copied().collect(),
        None => return,
    };

    while let Some(id) = stack.pop() {
        let Some(node) = graph.get_mut(id) else {
            continue;
        };
        if node.notified {
            continue;
        }
        node.notified = true;

        match node.kind {
            NodeKind::Derived => {
                node.outdated = true;
                stack.extend(node.targets.iter().rev().copied());
            }
            NodeKind::Effect => effects.push(id),
            NodeKind::Source => {}
        }
    }

    tracing::trace!(source = ?source, effects = effects.len(), "marked targets");
}
