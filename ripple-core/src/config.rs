//! Runtime configuration.
//!
//! Limits that guard the runtime against runaway graphs. Every field has a
//! default, so a partial JSON document is enough to override one of them.

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;

/// Default number of flush rounds before effects are considered cyclic.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 100;

/// Default limit on nested computed evaluations.
pub const DEFAULT_MAX_EVALUATION_DEPTH: usize = 256;

/// Per-thread runtime limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times the effect queue may be refilled while it is being
    /// drained. Effects that keep re-triggering each other past this point
    /// are dropped and the condition is logged.
    pub max_flush_iterations: usize,

    /// How deeply computed values may nest while evaluating.
    pub max_evaluation_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
            max_evaluation_depth: DEFAULT_MAX_EVALUATION_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ReactiveError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ReactiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, ReactiveError> {
        serde_json::to_string(self).map_err(|e| ReactiveError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<(), ReactiveError> {
        if self.max_flush_iterations == 0 {
            return Err(ReactiveError::Config(
                "max_flush_iterations must be at least 1".into(),
            ));
        }
        if self.max_evaluation_depth == 0 {
            return Err(ReactiveError::Config(
                "max_evaluation_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
