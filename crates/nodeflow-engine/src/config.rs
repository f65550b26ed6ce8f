//! Configuration types for the engine

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{defaults, env_vars};

/// Runtime knobs shared by every run a supervisor starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Await deadline in seconds for nodes without an explicit timeout
    pub default_await_timeout_secs: f64,
    /// Seconds `stop` waits for cancelled activations to finish
    pub stop_grace_period_secs: f64,
    /// Log grouped inputs before every execution
    pub log_node_inputs: bool,
    /// Emit `NodeWaiting` observer events
    pub emit_waiting_events: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_await_timeout_secs: defaults::AWAIT_TIMEOUT_SECS,
            stop_grace_period_secs: defaults::STOP_GRACE_PERIOD_SECS,
            log_node_inputs: defaults::LOG_NODE_INPUTS,
            emit_waiting_events: defaults::EMIT_WAITING_EVENTS,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NODEFLOW_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secs) = parse_override::<f64>(&lookup, env_vars::AWAIT_TIMEOUT_SECS) {
            self.default_await_timeout_secs = secs;
        }
        if let Some(secs) = parse_override::<f64>(&lookup, env_vars::STOP_GRACE_PERIOD_SECS) {
            self.stop_grace_period_secs = secs;
        }
        if let Some(flag) = parse_override::<bool>(&lookup, env_vars::LOG_NODE_INPUTS) {
            self.log_node_inputs = flag;
        }
        if let Some(flag) = parse_override::<bool>(&lookup, env_vars::EMIT_WAITING_EVENTS) {
            self.emit_waiting_events = flag;
        }
        self
    }

    pub fn default_await_timeout(&self) -> Duration {
        seconds(self.default_await_timeout_secs)
    }

    pub fn stop_grace_period(&self) -> Duration {
        seconds(self.stop_grace_period_secs)
    }
}

/// Convert a possibly negative or non-finite number of seconds to a duration.
pub fn seconds(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid value '{}' for {}", raw, key);
            None
        }
    }
}
