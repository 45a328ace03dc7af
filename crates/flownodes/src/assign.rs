use async_trait::async_trait;
use flowcore::{NodeError, NodeSpec, Value, VertexResult};
use flowexpr::{Component, ComponentEvaluator};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AssignMode {
    #[default]
    Set,
    /// Push onto an array variable, creating it when absent.
    Append,
}

#[derive(Debug, Clone, Deserialize)]
struct Assignment {
    variable: String,
    value: Component,
    #[serde(default)]
    mode: AssignMode,
}

#[derive(Debug, Clone, Deserialize)]
struct AssignParams {
    assignments: Vec<Assignment>,
}

/// Writes flow variables (`var.*`).
pub struct AssignRunner;

#[async_trait]
impl NodeRunner for AssignRunner {
    fn node_type(&self) -> &str {
        "assign"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("data", "Set or append flow variables")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params: AssignParams = parse_params(node)?;
        for assignment in &params.assignments {
            if assignment.variable.trim().is_empty() {
                return Err(NodeError::Configuration("empty variable name".to_string()));
            }
            evaluator.prepare(&assignment.value)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: AssignParams = ctx.params()?;
        let mut assigned = HashMap::new();

        // assignments apply in order, so later ones see earlier writes
        for assignment in &params.assignments {
            let value = ctx.evaluate(&assignment.value)?;
            let value = match assignment.mode {
                AssignMode::Set => value,
                AssignMode::Append => match ctx.data.variable(&assignment.variable).cloned() {
                    None | Some(Value::Null) => Value::Array(vec![value]),
                    Some(Value::Array(mut items)) => {
                        items.push(value);
                        Value::Array(items)
                    }
                    Some(other) => {
                        return Err(NodeError::InvalidInputType {
                            field: assignment.variable.clone(),
                            expected: "array".to_string(),
                            actual: other.type_name().to_string(),
                        })
                    }
                },
            };
            ctx.data.set_variable(assignment.variable.clone(), value.clone());
            assigned.insert(assignment.variable.clone(), value);
        }

        Ok(VertexResult::success(ctx.node.next_nodes.clone()).with_output(Value::Object(assigned)))
    }
}
