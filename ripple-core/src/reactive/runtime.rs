//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computed
//! values and effects. It owns the dependency graph, the registry of live
//! nodes and the batch depth, and it drains the effect queue.
//!
//! # How It Works
//!
//! 1. When a node is created, it registers with the runtime and receives a
//!    [`ReactiveHandle`] that unregisters it when dropped.
//!
//! 2. When a computed value or effect reads a node, the read is recorded in
//!    the current [`ReactiveContext`] frame. When the evaluation ends, the
//!    frame is diffed against the previous dependency set.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Bumps its version and marks dependents dirty / maybe dirty
//!    b. Queues every effect reached
//!    c. Once the outermost batch exits, runs each queued effect that still
//!       has a changed dependency
//!    d. Leaves computed values stale; they recompute on next access
//!
//! # Threading
//!
//! The runtime is thread-local and the handles are `!Send`, so a graph is
//! confined to the thread that built it. Nothing here takes a lock; the only
//! shared state is behind `RefCell`s that are never borrowed while user code
//! runs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tokio::task::JoinHandle;

use tracing::{debug, error, trace};

use super::context::ReactiveContext;
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{DirtyState, NodeId, NodeKind, Observed, UpdateScheduler};

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// A node the runtime can bring up to date.
pub(crate) trait Reactive {
    /// Re-evaluate a computed value or re-run an effect.
    fn update(&self);
}

/// Handle to a registered node.
///
/// Dropping this handle removes the node and all its edges from the graph.
#[derive(Debug)]
pub struct ReactiveHandle {
    node_id: NodeId,
}

impl ReactiveHandle {
    pub fn id(&self) -> NodeId {
        self.node_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.node_id);
    }
}

/// Scope that defers effect runs until the outermost scope exits.
pub(crate) struct BatchScope {
    flush_on_exit: bool,
}

impl BatchScope {
    pub(crate) fn enter() -> Self {
        Self::open(true)
    }

    /// A scope that never flushes; used by the flush loop itself.
    fn silent() -> Self {
        Self::open(false)
    }

    fn open(flush_on_exit: bool) -> Self {
        let depth = Runtime::with(|rt| {
            let depth = rt.batch_depth.get() + 1;
            rt.batch_depth.set(depth);
            depth
        });
        trace!(depth, "batch start");
        Self { flush_on_exit }
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let depth = RUNTIME
            .try_with(|rt| {
                let depth = rt.batch_depth.get().saturating_sub(1);
                rt.batch_depth.set(depth);
                depth
            })
            .unwrap_or(0);
        trace!(depth, "batch end");

        // Writes made by a panicking batch stay queued for the next flush
        if self.flush_on_exit && depth == 0 && !std::thread::panicking() {
            Runtime::flush();
        }
    }
}

/// The per-thread reactive runtime.
pub struct Runtime {
    scheduler: RefCell<UpdateScheduler>,
    registry: RefCell<HashMap<NodeId, Weak<dyn Reactive>>>,
    batch_depth: Cell<usize>,
    config: RefCell<RuntimeConfig>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            scheduler: RefCell::new(UpdateScheduler::new()),
            registry: RefCell::new(HashMap::new()),
            batch_depth: Cell::new(0),
            config: RefCell::new(RuntimeConfig::default()),
        }
    }

    fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Install limits for the current thread's runtime.
    pub fn configure(config: RuntimeConfig) {
        debug!(?config, "runtime configured");
        Self::with(|rt| *rt.config.borrow_mut() = config);
    }

    /// The current thread's runtime limits.
    pub fn config() -> RuntimeConfig {
        Self::with(|rt| rt.config.borrow().clone())
    }

    /// Register a source node (signal).
    pub(crate) fn register_source() -> ReactiveHandle {
        let node_id = NodeId::new();
        Self::with(|rt| rt.scheduler.borrow_mut().add_node(node_id, NodeKind::Source));
        ReactiveHandle { node_id }
    }

    /// Register a derived node or an effect.
    ///
    /// The registry keeps only a weak reference, so the graph never keeps a
    /// node alive on its own.
    pub(crate) fn register(
        node_id: NodeId,
        kind: NodeKind,
        reactive: Weak<dyn Reactive>,
    ) -> ReactiveHandle {
        Self::with(|rt| {
            rt.scheduler.borrow_mut().add_node(node_id, kind);
            rt.registry.borrow_mut().insert(node_id, reactive);
        });
        ReactiveHandle { node_id }
    }

    fn unregister(node_id: NodeId) {
        // The runtime may already be gone during thread teardown
        let _ = RUNTIME.try_with(|rt| {
            rt.registry.borrow_mut().remove(&node_id);
            rt.scheduler.borrow_mut().remove_node(node_id);
        });
    }

    fn lookup(node_id: NodeId) -> Option<Rc<dyn Reactive>> {
        Self::with(|rt| rt.registry.borrow().get(&node_id).and_then(Weak::upgrade))
    }

    /// Get the node whose dependencies are currently being collected.
    pub fn current_subscriber() -> Option<NodeId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Check if effect runs are currently deferred.
    pub fn is_batching() -> bool {
        Self::with(|rt| rt.batch_depth.get() > 0)
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        Self::with(|rt| rt.scheduler.borrow().node_count())
    }

    /// Number of effects waiting for the current batch to end.
    pub fn pending_effects() -> usize {
        Self::with(|rt| rt.scheduler.borrow().pending_len())
    }

    pub(crate) fn version(node_id: NodeId) -> u64 {
        Self::with(|rt| rt.scheduler.borrow().version(node_id).unwrap_or(0))
    }

    pub(crate) fn state(node_id: NodeId) -> DirtyState {
        Self::with(|rt| {
            rt.scheduler
                .borrow()
                .get_node(node_id)
                .map_or(DirtyState::Clean, |node| node.dirty_state())
        })
    }

    pub(crate) fn subscriber_count(node_id: NodeId) -> usize {
        Self::with(|rt| {
            rt.scheduler
                .borrow()
                .get_node(node_id)
                .map_or(0, |node| node.dependents().len())
        })
    }

    pub(crate) fn dependency_count(node_id: NodeId) -> usize {
        Self::with(|rt| {
            rt.scheduler
                .borrow()
                .get_node(node_id)
                .map_or(0, |node| node.dependencies().len())
        })
    }

    /// Record a read of `node_id` in the current tracking frame, if any.
    pub(crate) fn track_read(node_id: NodeId) {
        if ReactiveContext::is_active() {
            ReactiveContext::track_dependency(node_id, Self::version(node_id));
        }
    }

    /// A source's value changed: mark everything downstream and, outside of
    /// a batch, run the affected effects.
    pub(crate) fn notify_changed(node_id: NodeId) {
        let queued = Self::with(|rt| rt.scheduler.borrow_mut().mark_changed(node_id));
        trace!(node = %node_id, queued, "source changed");

        if !Self::is_batching() {
            Self::flush();
        }
    }

    /// Bring a derived node up to date before it is read.
    pub(crate) fn refresh(node_id: NodeId) -> Result<(), ReactiveError> {
        let probe = Self::with(|rt| {
            rt.scheduler
                .borrow()
                .get_node(node_id)
                .map(|node| (node.dirty_state(), node.is_evaluating()))
        });
        let Some((state, evaluating)) = probe else {
            return Ok(());
        };

        if state == DirtyState::Clean {
            return Ok(());
        }
        if evaluating {
            return Err(ReactiveError::Cycle(node_id));
        }
        let max_depth = Self::with(|rt| rt.config.borrow().max_evaluation_depth);
        if ReactiveContext::depth() >= max_depth {
            return Err(ReactiveError::DepthExceeded(max_depth));
        }

        if state == DirtyState::MaybeDirty && !Self::dependencies_changed(node_id) {
            Self::with(|rt| {
                if let Some(node) = rt.scheduler.borrow_mut().get_node_mut(node_id) {
                    node.mark_clean();
                }
            });
            trace!(node = %node_id, "dependencies unchanged, reusing cached value");
            return Ok(());
        }

        if let Some(reactive) = Self::lookup(node_id) {
            reactive.update();
        }
        Ok(())
    }

    /// Check, in read order, whether any dependency moved past the version
    /// observed at the last evaluation. Derived dependencies are refreshed
    /// first so that an equal recomputation does not count as a change.
    fn dependencies_changed(node_id: NodeId) -> bool {
        let deps = Self::with(|rt| {
            let mut scheduler = rt.scheduler.borrow_mut();
            scheduler.get_node_mut(node_id).map(|node| {
                node.set_evaluating(true);
                node.dependencies().clone()
            })
        });
        let Some(deps) = deps else {
            return false;
        };

        let mut changed = false;
        for (dep_id, seen) in deps {
            let kind = Self::with(|rt| rt.scheduler.borrow().get_node(dep_id).map(|n| n.kind()));
            if kind == Some(NodeKind::Derived) && Self::refresh(dep_id).is_err() {
                changed = true;
                break;
            }
            let current = Self::with(|rt| rt.scheduler.borrow().version(dep_id));
            if current != Some(seen) {
                changed = true;
                break;
            }
        }

        Self::with(|rt| {
            if let Some(node) = rt.scheduler.borrow_mut().get_node_mut(node_id) {
                node.set_evaluating(false);
            }
        });
        changed
    }

    /// Mark a derived node as being evaluated, for cycle detection.
    pub(crate) fn begin_evaluation(node_id: NodeId) {
        Self::with(|rt| {
            if let Some(node) = rt.scheduler.borrow_mut().get_node_mut(node_id) {
                node.set_evaluating(true);
            }
        });
    }

    /// Store the dependencies of a finished evaluation and publish whether
    /// the value changed.
    pub(crate) fn complete_evaluation(node_id: NodeId, observed: Observed, changed: bool) {
        Self::with(|rt| {
            let mut scheduler = rt.scheduler.borrow_mut();
            scheduler.rewire(node_id, observed);
            scheduler.finish_evaluation(node_id, changed);
        });
    }

    /// An effect is about to run. It is marked clean first so that writes
    /// made during the run re-queue it.
    pub(crate) fn begin_run(node_id: NodeId) {
        Self::with(|rt| {
            if let Some(node) = rt.scheduler.borrow_mut().get_node_mut(node_id) {
                node.mark_clean();
                node.set_evaluating(true);
            }
        });
    }

    /// Store the dependencies of a finished effect run.
    pub(crate) fn complete_run(node_id: NodeId, observed: Observed) {
        let requeued = Self::with(|rt| {
            let mut scheduler = rt.scheduler.borrow_mut();
            scheduler.rewire(node_id, observed);
            if let Some(node) = scheduler.get_node_mut(node_id) {
                node.set_evaluating(false);
            }
            scheduler.requeue_if_stale(node_id)
        });
        if requeued {
            trace!(effect = %node_id, "dependency changed during run, requeued");
        }
    }

    /// Remove every edge of a node that is being disposed.
    pub(crate) fn detach(node_id: NodeId) {
        let _ = RUNTIME.try_with(|rt| rt.scheduler.borrow_mut().detach(node_id));
    }

    fn needs_run(node_id: NodeId) -> bool {
        match Self::state(node_id) {
            DirtyState::Clean => false,
            DirtyState::Dirty => true,
            DirtyState::MaybeDirty => {
                if Self::dependencies_changed(node_id) {
                    return true;
                }
                Self::with(|rt| {
                    if let Some(node) = rt.scheduler.borrow_mut().get_node_mut(node_id) {
                        node.mark_clean();
                    }
                });
                false
            }
        }
    }

    /// Run queued effects until the queue is empty.
    ///
    /// Effects that write signals while running queue more effects; those
    /// are picked up in the next round. Rounds are capped by
    /// `max_flush_iterations`.
    pub(crate) fn flush() {
        if Self::is_batching() {
            return;
        }
        let _scope = BatchScope::silent();
        let max_rounds = Self::with(|rt| rt.config.borrow().max_flush_iterations);
        let mut rounds = 0;

        loop {
            let pending = Self::with(|rt| rt.scheduler.borrow_mut().take_pending());
            if pending.is_empty() {
                break;
            }

            rounds += 1;
            if rounds > max_rounds {
                error!(
                    rounds = max_rounds,
                    dropped = pending.len(),
                    "reactive cycle detected: effects kept re-triggering, dropping the queue"
                );
                break;
            }
            debug!(round = rounds, effects = pending.len(), "flushing effects");

            for node_id in pending {
                let Some(reactive) = Self::lookup(node_id) else {
                    // Dead weak reference: treat as an implicit unsubscribe
                    Self::with(|rt| rt.scheduler.borrow_mut().remove_node(node_id));
                    continue;
                };
                if Self::needs_run(node_id) {
                    reactive.update();
                }
            }
        }
    }
}

/// Spawn a `!Send` future on the current [`LocalSet`](tokio::task::LocalSet).
///
/// tokio panics when no `LocalSet` is running; that is reported as
/// [`ReactiveError::NoLocalSet`] instead.
pub(crate) fn spawn_local<F>(future: F) -> Result<JoinHandle<F::Output>, ReactiveError>
where
    F: Future + 'static,
    F::Output: 'static,
{
    panic::catch_unwind(AssertUnwindSafe(|| tokio::task::spawn_local(future)))
        .map_err(|_| ReactiveError::NoLocalSet)
}
