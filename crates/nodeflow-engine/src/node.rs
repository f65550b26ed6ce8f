//! The node contract
//!
//! A node type implements [`Node`] plus [`DescribeNode`](crate::DescribeNode).
//! The scheduler owns every instance; it calls `load` once when the run is
//! instantiated and `execute` each time the node's wait set empties.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::{EventBroker, ListenerCallback};
use crate::config::EngineConfig;
use crate::descriptor::WidgetDescriptor;
use crate::error::{EngineError, Result};
use crate::events::{emit, EventSink, MessageKind, NullEventSink, WorkflowEvent};

/// Per-instance key/value store that survives re-executions within a run
pub type Memory = HashMap<String, Value>;

/// Callback an event-source node invokes for every delivered event
pub type EventTrigger = ListenerCallback;

/// A processing unit in a workflow graph
#[async_trait]
pub trait Node: Send {
    /// One-time initialization before any execution; an error aborts the run.
    fn load(&mut self, _ctx: &LoadContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Run the node on its grouped inputs.
    ///
    /// Outputs are positionally aligned with the declared output sockets.
    async fn execute(
        &mut self,
        inputs: NodeInputs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ExecutionResult>;

    /// Arm an event source. Only called for descriptors flagged `event_source`.
    async fn start_listening(
        &mut self,
        _ctx: &ListenContext<'_>,
        _trigger: EventTrigger,
    ) -> Result<()> {
        Ok(())
    }

    /// Disarm an event source.
    async fn stop_listening(&mut self, _ctx: &ListenContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Grouped inputs handed to `execute`
///
/// Array sockets arrive as a single `Value::Array` ordered by element index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInputs {
    values: HashMap<String, Value>,
}

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a required input or fail with `MissingInput`
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| EngineError::MissingInput(name.to_string()))
    }

    /// Numeric view of an input; numeric strings are accepted.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(as_number)
    }

    /// Require a numeric input
    pub fn require_number(&self, name: &str) -> Result<f64> {
        as_number(self.require(name)?).ok_or_else(|| EngineError::invalid_input(name, "number"))
    }

    pub fn array(&self, name: &str) -> Option<&[Value]> {
        self.get(name).and_then(Value::as_array).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        self.values
    }
}

impl From<HashMap<String, Value>> for NodeInputs {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for NodeInputs {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// One output slot value
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// A value pushed to every linked target
    Value(Value),
    /// Suppresses the downstream push for this slot
    Skip,
    /// Per-element values of an array socket
    Items(Vec<Output>),
}

impl Output {
    pub fn is_skip(&self) -> bool {
        matches!(self, Output::Skip)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Output::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn items(items: impl IntoIterator<Item = Output>) -> Self {
        Output::Items(items.into_iter().collect())
    }

    /// JSON form for observers; `Skip` is reported as `null`.
    pub fn to_report(&self) -> Value {
        match self {
            Output::Value(v) => v.clone(),
            Output::Skip => Value::Null,
            Output::Items(items) => Value::Array(items.iter().map(Output::to_report).collect()),
        }
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Value(value)
    }
}

/// Re-arming instructions returned alongside outputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    /// Wait-set template for every future re-activation
    pub wait_for_inputs: Vec<String>,
    /// Dependencies that must be pushed again instead of reused from cache
    #[serde(default)]
    pub do_wait_inputs: Vec<String>,
}

impl StateUpdate {
    pub fn wait_for<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            wait_for_inputs: inputs.into_iter().map(Into::into).collect(),
            do_wait_inputs: Vec::new(),
        }
    }

    pub fn force_wait<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.do_wait_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of one execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub outputs: Vec<Output>,
    pub state_update: Option<StateUpdate>,
}

impl ExecutionResult {
    pub fn new(outputs: Vec<Output>) -> Self {
        Self {
            outputs,
            state_update: None,
        }
    }

    /// No outputs (sink nodes)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_state_update(mut self, update: StateUpdate) -> Self {
        self.state_update = Some(update);
        self
    }
}

impl From<Vec<Output>> for ExecutionResult {
    fn from(outputs: Vec<Output>) -> Self {
        Self::new(outputs)
    }
}

/// Widget values bound to their declarations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetValues {
    values: HashMap<String, Value>,
}

impl WidgetValues {
    /// Bind serialized values to declarations by position.
    ///
    /// Missing values fall back to the declared default; extra values are
    /// ignored.
    pub fn bind(declarations: &[WidgetDescriptor], values: &[Value]) -> Self {
        if values.len() > declarations.len() {
            log::debug!(
                "Ignoring {} widget value(s) without a declaration",
                values.len() - declarations.len()
            );
        }
        let values = declarations
            .iter()
            .enumerate()
            .map(|(i, decl)| {
                let value = values.get(i).cloned().unwrap_or_else(|| decl.default.clone());
                (decl.name.clone(), value)
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(as_number)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}

/// Shared services every node execution can reach
#[derive(Clone)]
pub struct RunServices {
    pub broker: Arc<EventBroker>,
    pub sink: Arc<dyn EventSink>,
    pub config: Arc<EngineConfig>,
}

impl RunServices {
    pub fn new(broker: Arc<EventBroker>, sink: Arc<dyn EventSink>, config: Arc<EngineConfig>) -> Self {
        Self { broker, sink, config }
    }

    /// Fresh broker, no observer, default config
    pub fn detached() -> Self {
        Self::new(
            Arc::new(EventBroker::new()),
            Arc::new(NullEventSink),
            Arc::new(EngineConfig::default()),
        )
    }
}

impl std::fmt::Debug for RunServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunServices")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What a node sees while executing
pub struct ExecutionContext<'a> {
    node_id: &'a str,
    run_id: &'a str,
    node_type: &'a str,
    widgets: &'a WidgetValues,
    memory: &'a mut Memory,
    services: &'a RunServices,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        node_id: &'a str,
        run_id: &'a str,
        node_type: &'a str,
        widgets: &'a WidgetValues,
        memory: &'a mut Memory,
        services: &'a RunServices,
    ) -> Self {
        Self {
            node_id,
            run_id,
            node_type,
            widgets,
            memory,
            services,
        }
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    pub fn run_id(&self) -> &str {
        self.run_id
    }

    pub fn node_type(&self) -> &str {
        self.node_type
    }

    pub fn widgets(&self) -> &WidgetValues {
        self.widgets
    }

    pub fn memory(&self) -> &Memory {
        &*self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut *self.memory
    }

    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.services.broker
    }

    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    /// Fire-and-forget message to the observer channel
    pub fn send_message(&self, kind: MessageKind, payload: Value) {
        emit(
            self.services.sink.as_ref(),
            WorkflowEvent::node_message(self.run_id, self.node_id, self.node_type, kind, payload),
        );
    }
}

/// What a node sees during `load`
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    pub node_id: &'a str,
    pub widgets: &'a WidgetValues,
}

/// What an event source sees while arming or disarming
#[derive(Clone, Copy)]
pub struct ListenContext<'a> {
    pub node_id: &'a str,
    pub widgets: &'a WidgetValues,
    pub broker: &'a Arc<EventBroker>,
}

/// Numeric view of a value; numeric strings are accepted.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JSON number for `n`, using an integer when it has no fractional part.
pub fn number_value(n: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Text form of a value: strings bare, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
