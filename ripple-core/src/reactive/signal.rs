//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    read is recorded as a dependency of that context.
//!
//! 2. When a signal's value changes, its version is bumped and everything
//!    downstream is marked stale.
//!
//! 3. Effects reached by the change run once the current batch ends.
//!
//! A write that the signal's equality predicate considers equal to the
//! current value is dropped entirely: no version bump, no notification.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A registration handle carrying its unique ID
//! - The value, behind a `RefCell`
//! - The equality predicate
//!
//! Subscriber edges live in the runtime's graph, not in the signal.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::trace;

use super::context::ReactiveContext;
use super::equality::{default_equal, EqualFn};
use super::runtime::{ReactiveHandle, Runtime};
use crate::graph::NodeId;

struct SignalInner<T> {
    handle: ReactiveHandle,
    value: RefCell<T>,
    equal: EqualFn<T>,
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal produces another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use ripple_core::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(value, default_equal())
    }

    /// Create a new signal with a custom equality predicate.
    pub fn with_equality(value: T, equal: EqualFn<T>) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                handle: Runtime::register_source(),
                value: RefCell::new(value),
                equal,
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.handle.id()
    }

    /// Number of value changes so far.
    pub fn version(&self) -> u64 {
        Runtime::version(self.id())
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the signal as
    /// a dependency of the current computation.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, tracking the read.
    ///
    /// Calling [`set`](Self::set) on the same signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track_read(self.id());
        f(&*self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Borrow the current value without tracking the read.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers.
    ///
    /// Does nothing if the new value is equal to the current one.
    pub fn set(&self, value: T) {
        let unchanged = (self.inner.equal)(&*self.inner.value.borrow(), &value);
        if unchanged {
            trace!(signal = %self.id(), "write suppressed by equality");
            return;
        }

        *self.inner.value.borrow_mut() = value;
        Runtime::notify_changed(self.id());
    }

    /// Update the value using a function of the current one.
    ///
    /// The function runs untracked, so reads inside it do not become
    /// dependencies of an enclosing computation.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let _untracked = ReactiveContext::untracked();
            f(&*self.inner.value.borrow())
        };
        self.set(next);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id())
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::equality::never_equal;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn equal_write_does_not_bump_version() {
        let signal = Signal::new(String::from("a"));
        assert_eq!(signal.version(), 0);

        signal.set(String::from("a"));
        assert_eq!(signal.version(), 0);

        signal.set(String::from("b"));
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn custom_equality() {
        let close_enough: EqualFn<f64> = Rc::new(|a: &f64, b: &f64| (a - b).abs() < 0.1);
        let signal = Signal::with_equality(1.0, close_enough);

        signal.set(1.05);
        assert_eq!(signal.get(), 1.0);
        assert_eq!(signal.version(), 0);

        signal.set(2.0);
        assert_eq!(signal.get(), 2.0);
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn never_equal_counts_every_write() {
        let signal = Signal::with_equality(vec![1], never_equal());
        signal.set(vec![1]);
        signal.set(vec![1]);
        assert_eq!(signal.version(), 2);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn reads_are_tracked_only_inside_a_context() {
        let signal = Signal::new(1);
        let owner = NodeId::new();

        let ctx = ReactiveContext::enter(owner);
        signal.get();
        signal.get_untracked();
        let deps = ctx.finish();

        assert_eq!(deps.as_slice(), &[(signal.id(), 0)]);
    }

    #[test]
    fn dropping_last_handle_removes_node() {
        let before = Runtime::node_count();
        let signal = Signal::new(1);
        let clone = signal.clone();
        assert_eq!(Runtime::node_count(), before + 1);

        drop(signal);
        assert_eq!(Runtime::node_count(), before + 1);
        drop(clone);
        assert_eq!(Runtime::node_count(), before);
    }
}
