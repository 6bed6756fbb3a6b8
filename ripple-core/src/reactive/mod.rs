//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computed values,
//! and effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed value or effect), the read is
//! recorded as a dependency of that context. When the signal's value changes,
//! all dependents are notified.
//!
//! ## Computed values
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only when it is read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as a log, a socket or a cache.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, record the dependency together with the
//! version that was read.
//!
//! Propagation is push-pull: a write only flags what lies downstream, and
//! values are recomputed when someone pulls them. Effects are the only nodes
//! the runtime pulls on its own.

mod batch;
mod computed;
mod context;
mod effect;
mod equality;
mod runtime;
mod signal;

pub use batch::{batch, untracked};
pub use computed::{Computed, ComputedBuilder, ErrorPolicy};
pub use context::ReactiveContext;
pub use effect::{Effect, OnCleanup};
pub use equality::{default_equal, never_equal, EqualFn};
pub use runtime::{ReactiveHandle, Runtime};
pub(crate) use runtime::spawn_local;
pub use signal::Signal;
