use async_trait::async_trait;
use flowcore::{DebugEntry, FlowError, NodeError, NodeId, NodeSpec, Value, VertexResult};
use flowexpr::{Component, ComponentEvaluator};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// One iteration per element of `items`.
    #[default]
    Items,
    /// Iterate while `condition` holds.
    While,
}

#[derive(Debug, Clone, Deserialize)]
struct LoopParams {
    /// Entry node of the body scope.
    body: NodeId,
    #[serde(default)]
    mode: LoopMode,
    #[serde(default)]
    items: Option<Component>,
    #[serde(default)]
    condition: Option<Component>,
    #[serde(default)]
    max_iterations: Option<usize>,
    /// Evaluated after each iteration; collected into `results`.
    #[serde(default)]
    collect: Option<Component>,
}

impl LoopParams {
    fn parse(node: &NodeSpec) -> Result<Self, NodeError> {
        let params: LoopParams = parse_params(node)?;
        match params.mode {
            LoopMode::Items if params.items.is_none() => Err(NodeError::Configuration(
                "items loop needs an 'items' component".to_string(),
            )),
            LoopMode::While if params.condition.is_none() => Err(NodeError::Configuration(
                "while loop needs a 'condition' component".to_string(),
            )),
            _ => Ok(params),
        }
    }
}

/// Repeats the body scope (nodes whose `parent_id` is this node), then
/// continues to `next_nodes` once.
///
/// While an iteration runs, `nodes.<loop id>` holds `{index, item}`.
pub struct LoopRunner;

#[async_trait]
impl NodeRunner for LoopRunner {
    fn node_type(&self) -> &str {
        "loop"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("control", "Run a nested body per item or while a condition holds")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params = LoopParams::parse(node)?;
        if params.max_iterations == Some(0) {
            return Err(NodeError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        for component in [&params.items, &params.condition, &params.collect]
            .into_iter()
            .flatten()
        {
            evaluator.prepare(component)?;
        }
        Ok(())
    }

    fn body_entries(&self, node: &NodeSpec) -> Result<Vec<NodeId>, NodeError> {
        Ok(vec![LoopParams::parse(node)?.body])
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params = LoopParams::parse(ctx.node)?;
        let max_iterations = params
            .max_iterations
            .unwrap_or(ctx.config().max_loop_iterations);

        let items = match (params.mode, &params.items) {
            (LoopMode::Items, Some(items)) => match ctx.evaluate(items)? {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => {
                    return Err(NodeError::InvalidInputType {
                        field: "items".to_string(),
                        expected: "array".to_string(),
                        actual: other.type_name().to_string(),
                    })
                }
            },
            _ => Vec::new(),
        };

        let loop_id = ctx.node.node_id.clone();
        let mut results = Vec::new();
        let mut debug_log = Vec::new();
        let mut index = 0usize;

        loop {
            let proceed = match (params.mode, &params.condition) {
                (LoopMode::Items, _) => index < items.len(),
                (LoopMode::While, Some(condition)) => ctx.evaluate_condition(condition)?,
                (LoopMode::While, None) => false,
            };
            if !proceed {
                break;
            }
            if index >= max_iterations {
                return Err(NodeError::ExecutionFailed(format!(
                    "loop '{}' exceeded {} iterations",
                    loop_id, max_iterations
                )));
            }

            let item = items.get(index).cloned().unwrap_or_default();
            ctx.data.set_node_output(
                loop_id.clone(),
                Value::object([("index", Value::from(index)), ("item", item.clone())]),
            );
            debug_log.push(DebugEntry::Iteration { index, item });

            ctx.run_body(&params.body, index).await.map_err(body_error)?;

            if let Some(collect) = &params.collect {
                results.push(ctx.evaluate(collect)?);
            }
            index += 1;
        }

        tracing::debug!(loop_id = %loop_id, iterations = index, "Loop finished");

        let output = Value::object([
            ("iterations", Value::from(index)),
            ("results", Value::Array(results)),
        ]);
        Ok(VertexResult::success(ctx.node.next_nodes.clone())
            .with_output(output)
            .with_debug_log(debug_log))
    }
}

fn body_error(err: FlowError) -> NodeError {
    match err {
        FlowError::Cancelled => NodeError::Cancelled,
        FlowError::Node(err) => err,
        FlowError::Workflow(err) => NodeError::Configuration(err.to_string()),
        other => NodeError::ExecutionFailed(other.to_string()),
    }
}
