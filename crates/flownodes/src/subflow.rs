use async_trait::async_trait;
use flowcore::{
    DebugEntry, ExecutionData, FlowError, NodeError, RunStatus, RunTrace, Trigger, TriggerType,
    Value, VertexResult,
};
use flowexpr::{Component, ComponentEvaluator};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Deserialize)]
struct SubFlowParams {
    flow: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    inputs: BTreeMap<String, Component>,
}

/// Runs another flow by code through the same executor.
pub struct SubFlowRunner;

#[async_trait]
impl NodeRunner for SubFlowRunner {
    fn node_type(&self) -> &str {
        "sub_flow"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("flow", "Invoke another flow and publish its output")
    }

    fn validate(&self, node: &flowcore::NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params: SubFlowParams = parse_params(node)?;
        for component in params.inputs.values() {
            evaluator.prepare(component)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: SubFlowParams = ctx.params()?;
        let mut child = child_data(ctx, &params.inputs)?;

        let trace = ctx
            .run_sub_flow(&params.flow, params.version.as_deref(), &mut child)
            .await
            .map_err(child_error)?;

        finish_child(ctx, &params.flow, trace)
    }
}

/// Fresh execution data for a child run, inputs evaluated in the parent.
pub(crate) fn child_data(
    ctx: &NodeContext<'_>,
    inputs: &BTreeMap<String, Component>,
) -> Result<ExecutionData, NodeError> {
    let mut values = HashMap::with_capacity(inputs.len());
    for (name, component) in inputs {
        values.insert(name.clone(), ctx.evaluate(component)?);
    }
    let trigger = Trigger::new(TriggerType::SubFlow {
        parent_code: ctx.flow.code.clone(),
        parent_node: ctx.node.node_id.clone(),
    });
    Ok(ExecutionData::new(trigger, ctx.data.operator().clone(), values))
}

/// Failures of a child run are failures of the calling node; only
/// cancellation unwinds through it.
pub(crate) fn child_error(err: FlowError) -> NodeError {
    match err {
        FlowError::Cancelled => NodeError::Cancelled,
        other => NodeError::ExecutionFailed(format!("child flow failed: {}", other)),
    }
}

pub(crate) fn finish_child(
    ctx: &NodeContext<'_>,
    code: &str,
    trace: RunTrace,
) -> Result<VertexResult, NodeError> {
    let debug = DebugEntry::SubFlow {
        code: code.to_string(),
        run_id: trace.run_id.to_string(),
        status: trace.status.as_str().to_string(),
        nodes: trace.len(),
    };

    if trace.status == RunStatus::PartiallyFailed {
        let failed: Vec<&str> = trace.failures().map(|e| e.node_id.as_str()).collect();
        return Err(NodeError::ExecutionFailed(format!(
            "flow '{}' finished with failed nodes: {}",
            code,
            failed.join(", ")
        )));
    }

    let output = trace.output.unwrap_or(Value::Null);
    Ok(VertexResult::success(ctx.node.next_nodes.clone())
        .with_output(output)
        .with_debug(debug))
}
