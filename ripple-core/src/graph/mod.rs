//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between signals, computed values and effects.
//!
//! # Overview
//!
//! The graph is directed:
//!
//! - Nodes represent sources (signals), derived values (computed) or effects
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When a signal changes, the scheduler walks the graph to mark affected
//! nodes as dirty and to queue the effects that must re-run.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized rather than spread across the typed nodes, so
//!    that marking and dependency diffing never touch user values.
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. Both forward (dependencies) and reverse (dependents) edges are kept,
//!    so that both the pull phase and the push phase walk in O(edges).

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind, Observed};
pub use scheduler::UpdateScheduler;
