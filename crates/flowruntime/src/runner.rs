use crate::{Capabilities, FlowExecutor, RuntimeConfig};
use async_trait::async_trait;
use flowcore::{
    ErrorHandling, EventEmitter, ExecutionData, Flow, FlowError, NodeError, NodeId, NodeSpec,
    RunTrace, Value, VertexResult,
};
use flowexpr::{Component, ComponentEvaluator, EvalError};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Behavior bound to one `(node type, version)` pair.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Node type this runner handles (e.g. "if", "loop").
    fn node_type(&self) -> &str;

    fn version(&self) -> &str {
        "v0"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::default()
    }

    /// Check the node's params at flow load time.
    fn validate(&self, _node: &NodeSpec, _evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        Ok(())
    }

    /// Every id this node may continue to in its own scope.
    fn edges(&self, node: &NodeSpec) -> Result<Vec<NodeId>, NodeError> {
        Ok(node.next_nodes.clone())
    }

    /// Entry nodes of scopes nested under this node (loop bodies).
    fn body_entries(&self, _node: &NodeSpec) -> Result<Vec<NodeId>, NodeError> {
        Ok(Vec::new())
    }

    /// Run the node and decide which downstream ids to continue to.
    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError>;
}

/// Metadata about a runner, shown by tooling.
#[derive(Debug, Clone)]
pub struct RunnerMetadata {
    pub description: String,
    pub category: String,
}

impl Default for RunnerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

impl RunnerMetadata {
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
        }
    }
}

/// Where a vertex runs: nesting depth of sub-flows and the enclosing loop body.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub depth: usize,
    pub scope: Option<NodeId>,
    pub iteration: Option<usize>,
}

impl Frame {
    pub fn root(depth: usize) -> Self {
        Self {
            depth,
            scope: None,
            iteration: None,
        }
    }
}

/// Everything a runner sees while executing one node.
pub struct NodeContext<'a> {
    pub node: &'a NodeSpec,
    pub flow: &'a Flow,
    pub data: &'a mut ExecutionData,
    pub events: EventEmitter,
    trace: &'a mut RunTrace,
    executor: &'a FlowExecutor,
    cancellation: &'a CancellationToken,
    frame: &'a Frame,
    triggered_by: Option<&'a str>,
}

impl<'a> NodeContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node: &'a NodeSpec,
        flow: &'a Flow,
        data: &'a mut ExecutionData,
        trace: &'a mut RunTrace,
        executor: &'a FlowExecutor,
        cancellation: &'a CancellationToken,
        frame: &'a Frame,
        triggered_by: Option<&'a str>,
        events: EventEmitter,
    ) -> Self {
        Self {
            node,
            flow,
            data,
            events,
            trace,
            executor,
            cancellation,
            frame,
            triggered_by,
        }
    }

    /// Deserialize the node's params into the runner's typed config.
    /// Malformed params are a configuration error.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
        parse_params(self.node)
    }

    pub fn evaluator(&self) -> &ComponentEvaluator {
        self.executor.evaluator()
    }

    pub fn evaluate(&self, component: &Component) -> Result<Value, EvalError> {
        self.executor.evaluator().evaluate(component, self.data)
    }

    pub fn evaluate_condition(&self, component: &Component) -> Result<bool, EvalError> {
        self.executor.evaluator().evaluate_condition(component, self.data)
    }

    /// Latest result of another node in this run.
    pub fn upstream(&self, node_id: &str) -> Option<&VertexResult> {
        self.trace.latest(node_id)
    }

    /// Node whose result enqueued this one.
    pub fn triggered_by(&self) -> Option<&str> {
        self.triggered_by
    }

    pub fn run_id(&self) -> String {
        self.trace.run_id.to_string()
    }

    pub fn frame(&self) -> &Frame {
        self.frame
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.executor.config()
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.executor.capabilities()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run one iteration of the body scope nested under this node, starting
    /// at `entry`. Body results land in the same trace and execution data.
    pub async fn run_body(&mut self, entry: &str, iteration: usize) -> Result<(), FlowError> {
        let frame = Frame {
            depth: self.frame.depth,
            scope: Some(self.node.node_id.clone()),
            iteration: Some(iteration),
        };
        self.executor
            .run_scope(
                self.flow,
                entry,
                &frame,
                &mut *self.data,
                &mut *self.trace,
                self.cancellation,
            )
            .await
    }

    /// Run another flow to completion with its own execution data.
    pub async fn run_flow(&self, flow: &Flow, data: &mut ExecutionData) -> Result<RunTrace, FlowError> {
        self.executor
            .execute_at_depth(flow, data, self.cancellation, self.frame.depth + 1)
            .await
    }

    pub async fn load_flow(&self, code: &str, version: Option<&str>) -> Result<Arc<Flow>, FlowError> {
        self.executor.loader().load_flow(code, version).await
    }

    /// Load a flow by code and run it as a child of this node.
    pub async fn run_sub_flow(
        &self,
        code: &str,
        version: Option<&str>,
        data: &mut ExecutionData,
    ) -> Result<RunTrace, FlowError> {
        self.executor
            .run_sub_flow(code, version, data, self.cancellation, self.frame.depth + 1)
            .await
    }
}

pub fn parse_params<T: DeserializeOwned>(node: &NodeSpec) -> Result<T, NodeError> {
    let params = if node.params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        node.params.clone()
    };
    serde_json::from_value(params).map_err(|e| {
        NodeError::Configuration(format!("invalid params for node '{}': {}", node.node_id, e))
    })
}

/// Shared wrapper around every runner call.
///
/// Always yields a `VertexResult` for recoverable failures, applies the
/// node's error handling, and lets fatal errors unwind out of the run.
pub async fn run_node(
    runner: &dyn NodeRunner,
    ctx: &mut NodeContext<'_>,
) -> Result<VertexResult, FlowError> {
    let policy = ctx.node.on_error.unwrap_or(ctx.flow.settings.on_error);

    let result = match runner.execute(ctx).await {
        Ok(result) => result,
        Err(NodeError::Cancelled) => return Err(FlowError::Cancelled),
        Err(err) if err.is_fatal() => {
            tracing::error!("Node {} failed fatally: {}", ctx.node.node_id, err);
            return Err(FlowError::Node(err));
        }
        Err(err) => {
            tracing::warn!("Node {} failed: {}", ctx.node.node_id, err);
            VertexResult::failure(&err)
        }
    };

    if result.is_success() {
        return Ok(result);
    }

    match policy {
        ErrorHandling::Stop => Ok(result.with_children(Vec::new())),
        ErrorHandling::Continue => {
            let next = ctx.node.next_nodes.clone();
            Ok(result.with_children(next))
        }
        ErrorHandling::Abort => {
            let message = result
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "node failed".to_string());
            Err(FlowError::Node(NodeError::ExecutionFailed(format!(
                "node '{}' aborted the run: {}",
                ctx.node.node_id, message
            ))))
        }
    }
}
