//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued. It runs once when
//!    the outermost batch ends, however many of its dependencies changed.
//!
//! 3. Each run tracks a fresh dependency set, so dependencies read only on a
//!    branch that was not taken stop triggering the effect.
//!
//! # Differences from Computed
//!
//! - Computed values return a value; effects do not.
//! - Computed values are lazy (compute on access); effects are eager (run
//!   when deps change).
//! - Computed values cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! An effect created with [`Effect::with_cleanup`] receives an [`OnCleanup`]
//! on every run. Closures registered there run, in registration order, before
//! the next run and when the effect is disposed.
//!
//! # Lifetime
//!
//! The graph only holds a weak reference to an effect. Dropping the last
//! handle disposes it, so keep the handle for as long as the effect should
//! stay active.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use super::context::ReactiveContext;
use super::runtime::{spawn_local, BatchScope, Reactive, ReactiveHandle, Runtime};
use crate::error::{panic_message, ReactiveError};
use crate::graph::{NodeId, NodeKind};

type Cleanup = Box<dyn FnOnce()>;
type EffectFn = Box<dyn FnMut(&OnCleanup)>;

/// Registers cleanup closures for the current run of an effect.
///
/// A new `OnCleanup` is handed to every run, so closures registered by a
/// stale run can never leak into a later one.
#[derive(Default)]
pub struct OnCleanup {
    callbacks: RefCell<Vec<Cleanup>>,
}

impl OnCleanup {
    /// Run `f` before the next run of the effect, or when it is disposed.
    pub fn register(&self, f: impl FnOnce() + 'static) {
        self.callbacks.borrow_mut().push(Box::new(f));
    }

    fn take(self) -> Vec<Cleanup> {
        self.callbacks.into_inner()
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("registered", &self.callbacks.borrow().len())
            .finish()
    }
}

struct EffectInner {
    handle: ReactiveHandle,
    run: RefCell<EffectFn>,
    cleanups: RefCell<Vec<Cleanup>>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[must_use = "an effect is disposed as soon as its last handle is dropped"]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish dependencies.
    pub fn new<F>(mut run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::from_fn(Box::new(move |_: &OnCleanup| run()))
    }

    /// Create an effect whose function can register cleanup closures.
    pub fn with_cleanup<F>(run: F) -> Self
    where
        F: FnMut(&OnCleanup) + 'static,
    {
        Self::from_fn(Box::new(run))
    }

    /// Create an effect whose body continues asynchronously.
    ///
    /// `f` runs synchronously inside the tracking scope, so only the reads it
    /// makes before returning its future become dependencies. The future is
    /// spawned on the current [`LocalSet`](tokio::task::LocalSet). A new run
    /// does not cancel the previous future; its future starts only after the
    /// previous one has finished, so runs never overlap.
    ///
    /// Fails with [`ReactiveError::NoAsyncContext`] outside a tokio runtime.
    /// Inside a runtime but outside a `LocalSet`, each run logs an error and
    /// its future is dropped.
    pub fn new_async<F, Fut>(mut f: F) -> Result<Self, ReactiveError>
    where
        F: FnMut() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ReactiveError::NoAsyncContext);
        }

        let previous: RefCell<Option<JoinHandle<()>>> = RefCell::new(None);
        Ok(Self::new(move || {
            let future = f();
            let previous_run = previous.borrow_mut().take();
            let spawned = spawn_local(async move {
                if let Some(previous_run) = previous_run {
                    let _ = previous_run.await;
                }
                if let Err(payload) = AssertUnwindSafe(future).catch_unwind().await {
                    error!(error = %panic_message(payload.as_ref()), "async effect panicked");
                }
            });
            match spawned {
                Ok(task) => *previous.borrow_mut() = Some(task),
                Err(err) => error!(error = %err, "async effect run dropped"),
            }
        }))
    }

    fn from_fn(run: EffectFn) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<EffectInner>| {
            let reactive: Weak<dyn Reactive> = weak.clone();
            EffectInner {
                handle: Runtime::register(NodeId::new(), NodeKind::Effect, reactive),
                run: RefCell::new(run),
                cleanups: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
                run_count: Cell::new(0),
            }
        });

        // Writes made by the first run are flushed once it returns
        {
            let _batch = BatchScope::enter();
            inner.execute();
        }

        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.handle.id()
    }

    /// Dispose of the effect.
    ///
    /// Pending cleanups run and every dependency edge is removed. After
    /// disposal the effect never runs again. Calling this twice is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.id())
    }
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.get() {
            return;
        }
        let id = self.handle.id();
        let Ok(mut run) = self.run.try_borrow_mut() else {
            trace!(effect = %id, "effect re-entered while running, skipped");
            return;
        };

        Runtime::begin_run(id);
        run_cleanups(id, self.cleanups.take());

        let on_cleanup = OnCleanup::default();
        let ctx = ReactiveContext::enter(id);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*run)(&on_cleanup)));
        let observed = ctx.finish();
        drop(run);

        if let Err(payload) = outcome {
            let err = ReactiveError::from_panic(payload);
            error!(effect = %id, error = %err, "effect panicked");
        }
        self.run_count.set(self.run_count.get() + 1);

        if self.disposed.get() {
            // Disposed from inside its own run
            run_cleanups(id, on_cleanup.take());
            return;
        }
        Runtime::complete_run(id, observed);
        *self.cleanups.borrow_mut() = on_cleanup.take();
        trace!(effect = %id, runs = self.run_count.get(), "effect ran");
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let id = self.handle.id();
        Runtime::detach(id);
        run_cleanups(id, self.cleanups.take());
        trace!(effect = %id, "effect disposed");
    }
}

fn run_cleanups(id: NodeId, cleanups: Vec<Cleanup>) {
    if cleanups.is_empty() {
        return;
    }
    // Reads made by cleanups are not dependencies of anything
    let _untracked = ReactiveContext::untracked();
    for cleanup in cleanups {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
            warn!(effect = %id, error = %panic_message(payload.as_ref()), "effect cleanup panicked");
        }
    }
}

impl Reactive for EffectInner {
    fn update(&self) {
        self.execute();
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
