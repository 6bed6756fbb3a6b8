//! Error types for the reactive runtime.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::graph::NodeId;

/// Boxed error type accepted from user code.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors produced by the reactive runtime.
///
/// The type is cheap to clone so that a failed computation can hand the same
/// error to every reader until one of its dependencies changes.
#[derive(Debug, Clone, Error)]
pub enum ReactiveError {
    /// A computed value was read while it was itself being evaluated.
    #[error("circular dependency detected while evaluating node {0}")]
    Cycle(NodeId),

    /// Nested evaluations exceeded the configured depth.
    #[error("evaluation depth limit of {0} exceeded")]
    DepthExceeded(usize),

    /// The user computation failed.
    #[error(transparent)]
    Computation(#[from] ComputationError),

    /// An async primitive was created outside of a tokio runtime.
    #[error("no async runtime is active on this thread")]
    NoAsyncContext,

    /// Async work was spawned outside of a tokio `LocalSet`.
    #[error("async work must be spawned inside a tokio LocalSet")]
    NoLocalSet,

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

impl ReactiveError {
    /// Turn a caught panic payload back into an error.
    ///
    /// Failures re-raised by [`Computed::get`](crate::Computed::get) carry a
    /// `ReactiveError` payload and come back out unchanged; anything else is
    /// reported as a panicked computation.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<ReactiveError>() {
            Ok(err) => *err,
            Err(payload) => ComputationError::Panicked(panic_message(payload.as_ref())).into(),
        }
    }
}

/// A failure inside a user computation.
#[derive(Debug, Clone, Error)]
pub enum ComputationError {
    /// The computation panicked.
    #[error("computation panicked: {0}")]
    Panicked(String),

    /// The computation returned an error.
    #[error("computation failed: {0}")]
    Failed(Arc<dyn StdError + Send + Sync + 'static>),
}

impl ComputationError {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(Arc::from(err.into()))
    }
}

/// The error stored by a [`Resource`](crate::Resource) when a load fails.
#[derive(Clone)]
pub struct LoadError(Arc<dyn StdError + Send + Sync + 'static>);

impl LoadError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(Arc::from(err.into()))
    }

    /// Build a load error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::msg(format!("loader panicked: {}", panic_message(payload.as_ref())))
    }

    /// The underlying error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoadError").field(&self.0.to_string()).finish()
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for LoadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<ReactiveError> for LoadError {
    fn from(err: ReactiveError) -> Self {
        Self::new(err)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = payload.downcast_ref::<ReactiveError>() {
        err.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}
