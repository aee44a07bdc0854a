//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between signals, computed values and effects.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent signals, computed values or effects
//! - Edges represent dependencies: if A read B during its last evaluation,
//!   there is an edge from B to A annotated with B's version at that time
//!
//! When a signal changes, we walk the subscribed edges to flag every
//! reachable computed as outdated and queue every reachable effect. Whether
//! a flagged node actually recomputes is decided later, by comparing the
//! versions it recorded against the current ones.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a per-thread generational arena (`slotmap`) rather than
//!    behind `Rc`/`Weak` pointers to each other. Edges are plain ids, so the
//!    graph itself never keeps anything alive.
//!
//! 2. Both directions of every edge are stored: sources for re-validation,
//!    targets for propagation.
//!
//! 3. A target only appears in its sources' target sets while it is
//!    tracking. Unobserved computeds are invisible to propagation.

mod node;
mod propagate;
mod store;

pub use node::{NodeId, NodeKind};
pub(crate) use node::{Driver, Edge, Hook, Node};
pub(crate) use propagate::mark_targets;
pub(crate) use store::Graph;
