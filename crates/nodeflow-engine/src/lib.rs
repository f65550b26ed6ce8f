//! Nodeflow Engine - push/pull graph execution
//!
//! This crate executes node graphs whose nodes are driven by a per-run
//! state machine. It supports:
//!
//! - Push triggering: an executed node feeds its outputs to linked inputs
//! - Pull triggering: dependency inputs are requested from upstream on demand
//! - Array sockets spread over numbered physical slots
//! - Output suppression with [`Output::Skip`]
//! - Loops through [`StateUpdate`] re-arming
//! - A cross-run [`EventBroker`] with correlated request/response collection
//!
//! # Architecture
//!
//! - `Scheduler`: one run; activations are tasks, run state sits behind a mutex
//! - `RunSupervisor`: a session owning the broker, the runs in flight and the
//!   armed event sources
//! - `EventSink`: observer channel (not tied to any transport)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nodeflow_engine::{LogEventSink, NodeRegistry, RunSupervisor, WorkflowGraph};
//!
//! let graph = WorkflowGraph::from_json(&std::fs::read_to_string("graph.json")?)?;
//! let supervisor = RunSupervisor::new(Arc::new(NodeRegistry::with_builtins()), Arc::new(LogEventSink));
//! let outcome = supervisor.run(&graph, "3", None).await?;
//! ```

pub mod broker;
pub mod config;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod graph;
pub mod node;
pub mod registry;
pub mod run_context;
pub mod scheduler;
pub mod supervisor;
pub mod types;

// Re-export key types
pub use broker::{AwaitOutcome, EventBroker, EventEnvelope, ListenerCallback};
pub use config::EngineConfig;
pub use descriptor::{DescribeNode, NodeDescriptor, SocketDescriptor, WidgetDescriptor};
pub use error::{EngineError, Result};
pub use events::{EventError, EventSink, LogEventSink, MessageKind, NullEventSink, VecEventSink, WorkflowEvent};
pub use graph::{GraphLink, GraphNode, GraphSlot, WorkflowGraph};
pub use node::{
    as_number, display_value, number_value, EventTrigger, ExecutionContext, ExecutionResult, ListenContext,
    LoadContext, Memory, Node, NodeInputs, Output, RunServices, StateUpdate, WidgetValues,
};
pub use registry::{NodeFactory, NodeRegistration, NodeRegistry};
pub use run_context::{NodeRunState, NodeSnapshot};
pub use scheduler::{RunStatus, Scheduler};
pub use supervisor::{RunOutcome, RunSupervisor};
pub use types::{NodeCategory, NodeId, SocketType, WidgetType};
