//! Update Scheduler
//!
//! The scheduler owns the dependency graph and decides which nodes become
//! stale when a source changes.
//!
//! # Algorithm
//!
//! Updates are split into a push phase and a pull phase:
//!
//! 1. When a source changes, its version is bumped and its direct dependents
//!    are marked `Dirty`.
//! 2. Everything further downstream is marked `MaybeDirty`. Propagation stops
//!    at nodes that are already non-clean, since their dependents were marked
//!    when they first became stale.
//! 3. Every effect reached by the walk is queued exactly once.
//! 4. Nothing recomputes here. Derived nodes recompute on their next read,
//!    effects when the runtime drains the queue.
//!
//! Because all marking of a batch finishes before the queue is drained, no
//! effect can observe a half-updated graph.

use std::collections::{HashMap, VecDeque};

use super::node::{DirtyState, Node, NodeId, NodeKind, Observed};

/// The update scheduler manages the dependency graph and the queue of
/// effects waiting to run.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,

    /// Effects reached by a change and not yet run.
    pending: VecDeque<NodeId>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, id: NodeId, kind: NodeKind) -> NodeId {
        self.nodes.insert(id, Node::new(id, kind));
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            for (dep_id, _) in node.dependencies() {
                if let Some(dep) = self.nodes.get_mut(dep_id) {
                    dep.remove_dependent(node_id);
                }
            }

            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_dependency(node_id);
                }
            }

            if node.is_queued() {
                self.pending.retain(|id| *id != node_id);
            }
        }
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Current version of a node, or `None` if it no longer exists.
    pub fn version(&self, node_id: NodeId) -> Option<u64> {
        self.nodes.get(&node_id).map(Node::version)
    }

    /// Replace the dependency set of `node_id` with the one observed during
    /// its latest evaluation.
    ///
    /// Edges to dependencies that were not read this time are removed, edges
    /// to new dependencies are added. Dependencies are never accumulated
    /// across runs.
    pub fn rewire(&mut self, node_id: NodeId, observed: Observed) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let previous = node.replace_dependencies(observed.clone());

        for (old, _) in &previous {
            if !observed.iter().any(|(id, _)| id == old) {
                if let Some(dep) = self.nodes.get_mut(old) {
                    dep.remove_dependent(node_id);
                }
            }
        }

        for (new, _) in &observed {
            if !previous.iter().any(|(id, _)| id == new) {
                if let Some(dep) = self.nodes.get_mut(new) {
                    dep.add_dependent(node_id);
                }
            }
        }
    }

    /// Drop every edge of `node_id` without removing the node itself.
    pub fn detach(&mut self, node_id: NodeId) {
        self.rewire(node_id, Observed::new());
    }

    /// Record that a source node's value changed and propagate dirty flags.
    ///
    /// Returns the number of effects newly queued.
    pub fn mark_changed(&mut self, source_id: NodeId) -> usize {
        let Some(source) = self.nodes.get_mut(&source_id) else {
            return 0;
        };
        source.bump_version();
        self.mark_dependents(source_id)
    }

    /// Record that a derived node produced a new value during a pull.
    ///
    /// Its dependents were already flagged when the node itself went stale,
    /// so they are only upgraded to `Dirty` here, without any further walk.
    /// Dependents that are evaluating right now are left alone.
    pub fn finish_evaluation(&mut self, node_id: NodeId, changed: bool) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        node.mark_clean();
        node.set_evaluating(false);
        if !changed {
            return;
        }
        node.bump_version();

        let dependents: Vec<NodeId> = node.dependents().iter().copied().collect();
        for dependent_id in dependents {
            if let Some(dependent) = self.nodes.get_mut(&dependent_id) {
                // A running reader records the new version itself
                if dependent.is_evaluating() {
                    continue;
                }
                let was_clean = dependent.mark_dirty();
                if was_clean && dependent.kind() == NodeKind::Effect && !dependent.is_queued() {
                    dependent.set_queued(true);
                    self.pending.push_back(dependent_id);
                }
            }
        }
    }

    /// Re-flag an effect whose dependencies moved while it was running.
    ///
    /// Covers writes that happen before the run's edges exist, such as an
    /// effect writing a signal it read during its very first run. Returns
    /// `true` if the effect was queued again.
    pub fn requeue_if_stale(&mut self, node_id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&node_id) else {
            return false;
        };
        let stale = node
            .dependencies()
            .iter()
            .any(|(dep, seen)| self.version(*dep).is_some_and(|current| current != *seen));
        if !stale {
            return false;
        }

        let Some(node) = self.nodes.get_mut(&node_id) else {
            return false;
        };
        node.mark_dirty();
        if node.kind() != NodeKind::Effect || node.is_queued() {
            return false;
        }
        node.set_queued(true);
        self.pending.push_back(node_id);
        true
    }

    fn mark_dependents(&mut self, source_id: NodeId) -> usize {
        let mut queued = 0;
        let mut queue: VecDeque<(NodeId, DirtyState)> = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            for dependent_id in source.dependents() {
                queue.push_back((*dependent_id, DirtyState::Dirty));
            }
        }

        while let Some((node_id, state)) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };

            let was_clean = match state {
                DirtyState::Dirty => node.mark_dirty(),
                _ => node.mark_maybe_dirty(),
            };

            if node.kind() == NodeKind::Effect && !node.is_queued() {
                node.set_queued(true);
                self.pending.push_back(node_id);
                queued += 1;
            }

            // Dependents of an already-stale node were flagged when it went stale
            if was_clean {
                for dependent_id in node.dependents() {
                    queue.push_back((*dependent_id, DirtyState::MaybeDirty));
                }
            }
        }

        queued
    }

    /// Take every queued effect, in the order they were reached.
    pub fn take_pending(&mut self) -> Vec<NodeId> {
        let pending: Vec<NodeId> = self.pending.drain(..).collect();
        for id in &pending {
            if let Some(node) = self.nodes.get_mut(id) {
                node.set_queued(false);
            }
        }
        pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
