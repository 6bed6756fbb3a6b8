//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Values Work
//!
//! 1. On first access, the computed runs its function and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns the cache.
//!
//! 3. When a dependency changes, the computed is marked dirty (direct
//!    dependency) or maybe dirty (something further upstream). It does not
//!    recompute at that point.
//!
//! 4. On next access, a maybe-dirty computed checks whether any dependency
//!    version moved. Only if one did does it run its function again.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computed values depend on it
//! - Only the ones actually read will recompute
//! - Computed values that are never read stay dirty (no wasted work)
//!
//! # Failures
//!
//! A computation can fail by returning an error (see [`Computed::fallible`])
//! or by panicking. What happens next is chosen explicitly per node:
//!
//! - [`ErrorPolicy::Propagate`] (default): the failure is cached and handed
//!   to every reader until a dependency changes.
//! - [`ErrorPolicy::Fallback`]: the failure is logged and the last good
//!   value, or the configured default, is served instead.
//!
//! [`Computed::get`] re-raises a propagated failure as a panic, and every
//! such panic passes through the panic hook, which prints a line to stderr
//! even though the reading node catches it. Code that expects failures
//! should read with [`Computed::try_get`], or build the reader with
//! [`Computed::fallible`] and return the error with `?`.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::equality::{default_equal, EqualFn};
use super::runtime::{ReactiveHandle, Reactive, Runtime};
use crate::error::{BoxError, ComputationError, ReactiveError};
use crate::graph::{DirtyState, NodeId, NodeKind};

type ComputeFn<T> = Box<dyn Fn() -> Result<T, ComputationError>>;

/// What a computed value does when its function fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Re-raise the failure on every read until a dependency changes.
    #[default]
    Propagate,

    /// Log the failure and keep serving the last good value, or the
    /// configured default if there is none yet.
    Fallback,
}

struct ComputedInner<T> {
    handle: ReactiveHandle,
    compute: ComputeFn<T>,
    value: RefCell<Option<T>>,
    error: RefCell<Option<ReactiveError>>,
    equal: EqualFn<T>,
    policy: ErrorPolicy,
    default: Option<T>,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Computed, Signal};
///
/// let x = Signal::new(10);
/// let y = Signal::new(20);
/// let sum = Computed::new({
///     let (x, y) = (x.clone(), y.clone());
///     move || x.get() + y.get()
/// });
///
/// assert_eq!(sum.get(), 30);
/// x.set(15);
/// assert_eq!(sum.get(), 35);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

/// Configures a [`Computed`] before it is created.
pub struct ComputedBuilder<T: 'static> {
    compute: ComputeFn<T>,
    equal: EqualFn<T>,
    policy: ErrorPolicy,
    default: Option<T>,
}

impl<T: Clone + PartialEq + 'static> ComputedBuilder<T> {
    /// Start from an infallible computation.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::from_compute(Box::new(move || Ok(compute())), default_equal())
    }

    /// Start from a computation that can return an error.
    pub fn fallible<F, E>(compute: F) -> Self
    where
        F: Fn() -> Result<T, E> + 'static,
        E: Into<BoxError>,
    {
        Self::from_compute(
            Box::new(move || compute().map_err(ComputationError::failed)),
            default_equal(),
        )
    }
}

impl<T: Clone + 'static> ComputedBuilder<T> {
    fn from_compute(compute: ComputeFn<T>, equal: EqualFn<T>) -> Self {
        Self {
            compute,
            equal,
            policy: ErrorPolicy::Propagate,
            default: None,
        }
    }

    /// Replace the equality predicate used to decide whether a new result
    /// is a change.
    pub fn equal(mut self, equal: EqualFn<T>) -> Self {
        self.equal = equal;
        self
    }

    /// Switch to [`ErrorPolicy::Fallback`], serving `default` until a
    /// computation succeeds.
    pub fn fallback(mut self, default: T) -> Self {
        self.policy = ErrorPolicy::Fallback;
        self.default = Some(default);
        self
    }

    pub fn build(self) -> Computed<T> {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let reactive: Weak<dyn Reactive> = weak.clone();
            ComputedInner {
                handle: Runtime::register(NodeId::new(), NodeKind::Derived, reactive),
                compute: self.compute,
                value: RefCell::new(None),
                error: RefCell::new(None),
                equal: self.equal,
                policy: self.policy,
                default: self.default,
            }
        });
        Computed { inner }
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Create a new computed value with the given function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        ComputedBuilder::new(compute).build()
    }

    /// Create a computed value whose function can fail.
    pub fn fallible<F, E>(compute: F) -> Self
    where
        F: Fn() -> Result<T, E> + 'static,
        E: Into<BoxError>,
    {
        ComputedBuilder::fallible(compute).build()
    }

    pub fn builder<F>(compute: F) -> ComputedBuilder<T>
    where
        F: Fn() -> T + 'static,
    {
        ComputedBuilder::new(compute)
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value for a type without `PartialEq`.
    pub fn with_equality<F>(compute: F, equal: EqualFn<T>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        ComputedBuilder::from_compute(Box::new(move || Ok(compute())), equal).build()
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.handle.id()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics with the [`ReactiveError`] as payload if the computation failed
    /// under [`ErrorPolicy::Propagate`]. When the read happens inside another
    /// computed or an effect, that node catches the payload and records the
    /// same error. Use [`try_get`](Self::try_get) to handle it directly.
    ///
    /// The panic goes through the installed panic hook on every read, so the
    /// default hook reports it on stderr each time the error is passed along.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| panic::panic_any(err))
    }

    /// Get the current value, or the error of the last evaluation.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        let id = self.id();
        let refreshed = Runtime::refresh(id);
        Runtime::track_read(id);
        refreshed?;
        self.inner.cached(id)
    }

    /// Get the current value without tracking the read.
    pub fn get_untracked(&self) -> T {
        let _untracked = ReactiveContext::untracked();
        self.get()
    }

    /// Number of times the value actually changed.
    pub fn version(&self) -> u64 {
        Runtime::version(self.id())
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        Runtime::state(self.id())
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.inner.policy
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of nodes reading this computed.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id())
    }

    /// Get the number of nodes read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.id())
    }
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn cached(&self, id: NodeId) -> Result<T, ReactiveError> {
        if let Some(err) = self.error.borrow().as_ref() {
            return Err(err.clone());
        }
        // Only a read in the middle of the node's own first evaluation finds
        // neither a value nor an error
        self.value.borrow().clone().ok_or(ReactiveError::Cycle(id))
    }

    fn evaluate(&self) {
        let id = self.handle.id();
        Runtime::begin_evaluation(id);

        let ctx = ReactiveContext::enter(id);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.compute)()));
        let observed = ctx.finish();

        let outcome = match outcome {
            Ok(result) => result.map_err(ReactiveError::from),
            Err(payload) => Err(ReactiveError::from_panic(payload)),
        };
        let changed = match outcome {
            Ok(next) => self.store_value(next),
            Err(err) => self.store_error(id, err),
        };

        trace!(computed = %id, changed, "computed re-evaluated");
        Runtime::complete_evaluation(id, observed, changed);
    }

    fn store_value(&self, next: T) -> bool {
        let had_error = self.error.borrow_mut().take().is_some();
        let unchanged = !had_error
            && self
                .value
                .borrow()
                .as_ref()
                .is_some_and(|current| (self.equal)(current, &next));

        if !unchanged {
            *self.value.borrow_mut() = Some(next);
        }
        !unchanged
    }

    fn store_error(&self, id: NodeId, err: ReactiveError) -> bool {
        match self.policy {
            ErrorPolicy::Propagate => {
                *self.error.borrow_mut() = Some(err);
                true
            }
            ErrorPolicy::Fallback => {
                warn!(computed = %id, error = %err, "computation failed, serving fallback value");
                if self.value.borrow().is_some() {
                    return self.error.borrow_mut().take().is_some();
                }
                match self.default.clone() {
                    Some(default) => {
                        self.error.borrow_mut().take();
                        *self.value.borrow_mut() = Some(default);
                    }
                    None => *self.error.borrow_mut() = Some(err),
                }
                true
            }
        }
    }
}

impl<T: Clone + 'static> Reactive for ComputedInner<T> {
    fn update(&self) {
        self.evaluate();
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
