//! Ripple Core
//!
//! This crate provides a fine-grained reactive state graph. It implements:
//!
//! - Reactive primitives (signals, computed values, effects)
//! - Push-pull incremental propagation with glitch-free batching
//! - Async resources with cancellation of superseded loads
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Dependency graph and update scheduler
//! - `resource`: Async values driven by reactive parameters
//! - `config`: Per-thread runtime limits
//! - `error`: Error types shared by all of the above
//!
//! Every graph lives in a thread-local runtime. Handles are `!Send`; async
//! work runs on a tokio [`LocalSet`](tokio::task::LocalSet).
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let _effect = Effect::new({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("Count: {}, Doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod resource;

pub use config::RuntimeConfig;
pub use error::{BoxError, ComputationError, LoadError, ReactiveError};
pub use graph::{DirtyState, NodeId};
pub use reactive::{
    batch, untracked, Computed, ComputedBuilder, Effect, EqualFn, ErrorPolicy, OnCleanup,
    Runtime, Signal,
};
pub use resource::{LoaderArgs, Resource, ResourceSnapshot, ResourceStatus};
