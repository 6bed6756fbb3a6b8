//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! it is recorded as a dependency of the computation on top of the stack.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Entering a computed value or an
//! effect pushes a fresh, empty frame; every tracked read inside the
//! computation records `(node, version)` in that frame. When the computation
//! completes, the frame is popped and its contents become the node's new
//! dependency set.
//!
//! Frames are owned by a guard, so the stack is restored on every exit path,
//! panics included. Nested computations (a computed reading another computed)
//! simply stack frames.
//!
//! An *untracked* frame has no owner: reads inside it are not recorded
//! anywhere, which is how [`untracked`](super::untracked) is implemented.

use std::cell::RefCell;

use crate::graph::{NodeId, Observed};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    /// The node being evaluated, or `None` for an untracked scope.
    owner: Option<NodeId>,
    /// Dependencies read in this frame, with the version observed.
    dependencies: Observed,
}

/// Guard that pops its frame when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
#[derive(Debug)]
pub struct ReactiveContext {
    owner: Option<NodeId>,
    depth: usize,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new tracking frame for the given node.
    ///
    /// While this context is active, any signals that are read will be
    /// recorded as dependencies of `owner`.
    pub fn enter(owner: NodeId) -> Self {
        Self::push(Some(owner))
    }

    /// Enter a frame in which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(owner: Option<NodeId>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(ContextEntry {
                owner,
                dependencies: Observed::new(),
            });
            stack.len()
        });

        Self {
            owner,
            depth,
            finished: false,
        }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the node whose dependencies are currently being collected.
    pub fn current_subscriber() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.owner))
    }

    /// Number of frames on the stack, tracked or not.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Record a read of `node_id` at `version` in the current frame.
    ///
    /// Repeated reads of the same node within one frame are recorded once,
    /// with the version of the first read.
    pub fn track_dependency(node_id: NodeId, version: u64) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.owner.is_none() || entry.owner == Some(node_id) {
                    return;
                }
                if !entry.dependencies.iter().any(|(id, _)| *id == node_id) {
                    entry.dependencies.push((node_id, version));
                }
            }
        });
    }

    /// Pop this frame and return the dependencies it collected.
    pub fn finish(mut self) -> Observed {
        self.finished = true;
        self.pop().dependencies
    }

    fn pop(&self) -> ContextEntry {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            // A mismatch means a frame escaped its guard: the graph can no
            // longer be trusted.
            assert_eq!(
                stack.len(),
                self.depth,
                "tracking stack corrupted: frame for {:?} popped out of order",
                self.owner
            );
            let entry = stack
                .pop()
                .unwrap_or_else(|| unreachable!("tracking stack is non-empty at depth {}", self.depth));
            assert_eq!(
                entry.owner, self.owner,
                "tracking stack corrupted: expected {:?}, got {:?}",
                self.owner, entry.owner
            );
            entry
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}
