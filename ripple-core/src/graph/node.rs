//! Graph Nodes
//!
//! This module defines the bookkeeping record that every signal, computed
//! value and effect owns inside the dependency graph. The typed values live
//! in the user-facing handles; the graph only knows identities, versions,
//! dirty flags and edges.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (computed). These have dependencies and may have
    /// dependents. They cache their value and recompute lazily.
    Derived,

    /// An effect node. These are leaves of the graph and re-run eagerly.
    Effect,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// Something upstream changed, but not a direct dependency. The node
    /// must verify its dependencies' versions before deciding to recompute.
    MaybeDirty,

    /// A direct dependency changed. The node must recompute.
    Dirty,
}

/// Dependencies observed during one evaluation, with the version each one
/// had when it was read.
pub type Observed = SmallVec<[(NodeId, u64); 4]>;

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    dirty: DirtyState,

    /// Bumped every time the node's value actually changes.
    version: u64,

    /// Nodes this node read during its last evaluation, in read order.
    dependencies: Observed,

    /// Nodes that read this node, in subscription order.
    dependents: IndexSet<NodeId>,

    /// Set while the node is being verified or evaluated.
    evaluating: bool,

    /// Set while an effect sits in the pending queue.
    queued: bool,
}

impl Node {
    /// Create a new node with the given ID and kind.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: match kind {
                NodeKind::Source => DirtyState::Clean,
                // Start dirty to ensure first computation
                NodeKind::Derived | NodeKind::Effect => DirtyState::Dirty,
            },
            version: 0,
            dependencies: Observed::new(),
            dependents: IndexSet::new(),
            evaluating: false,
            queued: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty. Returns true if the node was clean.
    pub fn mark_maybe_dirty(&mut self) -> bool {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
            true
        } else {
            false
        }
    }

    /// Mark the node as definitely dirty. Returns true if the node was clean.
    pub fn mark_dirty(&mut self) -> bool {
        let was_clean = self.is_clean();
        self.dirty = DirtyState::Dirty;
        was_clean
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn dependencies(&self) -> &Observed {
        &self.dependencies
    }

    pub fn replace_dependencies(&mut self, deps: Observed) -> Observed {
        std::mem::replace(&mut self.dependencies, deps)
    }

    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.retain(|(id, _)| *id != node_id);
    }

    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating
    }

    pub fn set_evaluating(&mut self, evaluating: bool) {
        self.evaluating = evaluating;
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub fn set_queued(&mut self, queued: bool) {
        self.queued = queued;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn source_node_starts_clean() {
        let node = Node::new(NodeId::new(), NodeKind::Source);
        assert_eq!(node.kind(), NodeKind::Source);
        assert!(node.is_clean());
        assert_eq!(node.version(), 0);
    }

    #[test]
    fn derived_node_starts_dirty() {
        let node = Node::new(NodeId::new(), NodeKind::Derived);
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn dirty_state_transitions() {
        let mut node = Node::new(NodeId::new(), NodeKind::Derived);

        node.mark_clean();
        assert!(node.mark_maybe_dirty());
        assert_eq!(node.dirty_state(), DirtyState::MaybeDirty);

        // Already non-clean: maybe-dirty is a no-op, dirty upgrades silently
        assert!(!node.mark_maybe_dirty());
        assert!(!node.mark_dirty());
        assert_eq!(node.dirty_state(), DirtyState::Dirty);

        // Dirty never downgrades to maybe-dirty
        assert!(!node.mark_maybe_dirty());
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn dependents_keep_subscription_order() {
        let mut node = Node::new(NodeId::new(), NodeKind::Source);
        let (a, b, c) = (NodeId::new(), NodeId::new(), NodeId::new());

        node.add_dependent(a);
        node.add_dependent(b);
        node.add_dependent(c);
        node.add_dependent(a);
        node.remove_dependent(b);

        let order: Vec<_> = node.dependents().iter().copied().collect();
        assert_eq!(order, vec![a, c]);
    }
}
