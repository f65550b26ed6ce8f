//! Engine-wide constants
//!
//! Single source of truth for timeouts, configuration defaults and the
//! well-known keys shared between the scheduler and node implementations.

/// Default values for engine configuration
pub mod defaults {
    /// Deadline for await nodes that do not set their own timeout
    pub const AWAIT_TIMEOUT_SECS: f64 = 30.0;
    /// How long `stop` waits for in-flight activations to acknowledge cancellation
    pub const STOP_GRACE_PERIOD_SECS: f64 = 5.0;
    /// Log grouped node inputs at debug level
    pub const LOG_NODE_INPUTS: bool = true;
    /// Report wait-set changes to the observer
    pub const EMIT_WAITING_EVENTS: bool = true;
}

/// Keys the scheduler writes into node memory
pub mod memory_keys {
    /// Payload of the event that started an event-triggered run
    pub const INITIAL_PAYLOAD: &str = "initial_payload";
    /// Correlation id delivered alongside a correlated event
    pub const AWAIT_ID: &str = "await_id";
}

/// Prefixes for generated identifiers
pub mod id_prefixes {
    /// Runs started by a user command
    pub const RUN: &str = "run";
    /// Runs started by an event-source node
    pub const EVENT_RUN: &str = "event";
    /// Await correlation ids
    pub const AWAIT: &str = "await";
}

/// Environment variables read by `EngineConfig::from_env`
pub mod env_vars {
    pub const AWAIT_TIMEOUT_SECS: &str = "NODEFLOW_AWAIT_TIMEOUT_SECS";
    pub const STOP_GRACE_PERIOD_SECS: &str = "NODEFLOW_STOP_GRACE_SECS";
    pub const LOG_NODE_INPUTS: &str = "NODEFLOW_LOG_NODE_INPUTS";
    pub const EMIT_WAITING_EVENTS: &str = "NODEFLOW_EMIT_WAITING_EVENTS";
}
