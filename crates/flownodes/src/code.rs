use async_trait::async_trait;
use flowcore::{NodeError, NodeSpec, VertexResult};
use flowexpr::{Component, ComponentEvaluator, EvalError};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Deserialize)]
struct CodeParams {
    script: String,
    #[serde(default)]
    inputs: BTreeMap<String, Component>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Runs a sandboxed script that only sees its mapped inputs.
pub struct CodeRunner;

#[async_trait]
impl NodeRunner for CodeRunner {
    fn node_type(&self) -> &str {
        "code"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("data", "Evaluate a sandboxed script over mapped inputs")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params: CodeParams = parse_params(node)?;
        for (name, component) in &params.inputs {
            if !is_identifier(name) {
                return Err(NodeError::Configuration(format!(
                    "input name '{}' is not an identifier",
                    name
                )));
            }
            evaluator.prepare(component)?;
        }
        evaluator
            .sandbox()
            .check(&params.script)
            .map_err(|e| NodeError::from(EvalError::from(e)))
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: CodeParams = ctx.params()?;

        let mut bindings = HashMap::with_capacity(params.inputs.len());
        for (name, component) in &params.inputs {
            bindings.insert(name.clone(), ctx.evaluate(component)?);
        }

        let session = ctx
            .evaluator()
            .sandbox()
            .create_session(&params.script)
            .map_err(|e| NodeError::from(EvalError::from(e)))?;
        let output = session
            .evaluate(&bindings)
            .map_err(|e| NodeError::Evaluation(e.to_string()))?;

        Ok(VertexResult::success(ctx.node.next_nodes.clone()).with_output(output))
    }
}
