//! Error types for the node engine

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the node engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph names a node type nobody registered
    #[error("Unknown node type '{node_type}' for node {node_id}")]
    UnknownNodeType { node_id: String, node_type: String },

    /// The requested start node is not part of the graph
    #[error("Start node {0} not found in graph")]
    StartNodeNotFound(String),

    /// A node id that the current run does not know
    #[error("Node {0} not found")]
    NodeNotFound(String),

    /// One-time node initialization failed
    #[error("Node {node_id} failed to load: {message}")]
    LoadFailed { node_id: String, message: String },

    /// Missing required input
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Invalid input type
    #[error("Invalid input type for '{port}': expected {expected}")]
    InvalidInputType { port: String, expected: String },

    /// Assertion rejected by a test node
    #[error("Assertion Failed: {0}")]
    AssertionFailed(String),

    /// Node execution failed
    #[error("Node execution failed: {0}")]
    ExecutionFailed(String),

    /// Event source could not be armed or disarmed
    #[error("Event listener error: {0}")]
    Listener(String),

    /// No active run with this id
    #[error("Run {0} not found")]
    RunNotFound(String),

    /// Workflow was cancelled
    #[error("Workflow cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create an invalid input error for a socket
    pub fn invalid_input(port: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidInputType {
            port: port.into(),
            expected: expected.into(),
        }
    }

    /// True for errors that abort a run before any node executes.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::UnknownNodeType { .. } | Self::StartNodeNotFound(_) | Self::LoadFailed { .. }
        )
    }
}
