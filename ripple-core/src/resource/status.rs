use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Lifecycle state of a [`Resource`](super::Resource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Params are `None`; nothing is loaded.
    #[default]
    Idle,
    /// First load for the current params; there is no value.
    Loading,
    /// Manual reload; the previous value stays visible.
    Reloading,
    /// The latest load succeeded.
    Resolved,
    /// The latest load failed.
    Error,
    /// The value was written directly with `set` or `update`.
    Local,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Reloading => "reloading",
            Self::Resolved => "resolved",
            Self::Error => "error",
            Self::Local => "local",
        }
    }

    /// A load is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading | Self::Reloading)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a [`Resource`](super::Resource) exposes, read at one point.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot<T> {
    pub status: ResourceStatus,
    pub value: Option<T>,
    pub error: Option<LoadError>,
}
