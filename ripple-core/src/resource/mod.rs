//! Async Resources
//!
//! A [`Resource`] turns reactive params into an async value. It is built from
//! the reactive primitives: params are a [`Computed`](crate::Computed), a
//! private [`Effect`](crate::Effect) reacts to them, and status, value and
//! error are exposed as signals.
//!
//! # Lifecycle
//!
//! | From | Event | To |
//! |---|---|---|
//! | any | params become `None` | `Idle` |
//! | any | params change to `Some` | `Loading` (value cleared) |
//! | `Resolved` / `Error` / `Local` / `Reloading` | [`Resource::reload`] | `Reloading` (value kept) |
//! | `Loading` / `Reloading` | load succeeds | `Resolved` |
//! | `Loading` / `Reloading` | load fails | `Error` (value kept) |
//! | any | [`Resource::set`] / [`Resource::update`] | `Local` |
//!
//! # Cancellation
//!
//! Every load gets its own [`CancellationToken`](tokio_util::sync::CancellationToken).
//! A new load cancels the token of the load in flight, and so do local
//! writes and [`Resource::destroy`]. Cancellation is cooperative: the loader
//! decides when to look at the token. A load that completes anyway after
//! being superseded is discarded.

mod async_resource;
mod loader;
mod status;

pub use async_resource::Resource;
pub use loader::LoaderArgs;
pub use status::{ResourceSnapshot, ResourceStatus};
