//! Drives a single node outside a scheduler

use std::sync::Arc;

use nodeflow_engine::{
    DescribeNode, EngineConfig, EventBroker, ExecutionContext, ExecutionResult, Memory, Node, NodeInputs,
    Result, RunServices, VecEventSink, WidgetValues,
};
use serde_json::Value;

pub(crate) struct Harness {
    pub sink: Arc<VecEventSink>,
    pub broker: Arc<EventBroker>,
    pub services: RunServices,
    pub widgets: WidgetValues,
    pub memory: Memory,
}

impl Harness {
    /// Harness whose widgets are bound from `values` like a graph node's
    pub fn new<N: DescribeNode>(values: &[Value]) -> Self {
        let sink = Arc::new(VecEventSink::new());
        let broker = Arc::new(EventBroker::new());
        let services = RunServices::new(Arc::clone(&broker), sink.clone(), Arc::new(EngineConfig::default()));
        Self {
            sink,
            broker,
            services,
            widgets: WidgetValues::bind(&N::descriptor().widgets, values),
            memory: Memory::new(),
        }
    }

    pub async fn execute(&mut self, node: &mut dyn Node, inputs: NodeInputs) -> Result<ExecutionResult> {
        let mut ctx = ExecutionContext::new(
            "7",
            "run_test",
            "TestNode",
            &self.widgets,
            &mut self.memory,
            &self.services,
        );
        node.execute(inputs, &mut ctx).await
    }
}
