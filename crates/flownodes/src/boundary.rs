use async_trait::async_trait;
use flowcore::{DebugEntry, NodeError, NodeSpec, Value, VertexResult};
use flowexpr::{Component, ComponentEvaluator};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Entry of a flow: checks the run's inputs against the declared input schema.
pub struct StartRunner;

#[async_trait]
impl NodeRunner for StartRunner {
    fn node_type(&self) -> &str {
        "start"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("control", "Flow entry; validates inputs and fills defaults")
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        for field in &ctx.flow.input_schema {
            let current = ctx.data.input(&field.name).cloned().unwrap_or_default();
            let value = match (&current, &field.default) {
                (Value::Null, Some(default)) => {
                    ctx.data.set_input(field.name.clone(), default.clone());
                    default.clone()
                }
                _ => current,
            };

            field.check(&value)?;
        }

        let inputs = Value::Object(ctx.data.inputs().clone());
        Ok(VertexResult::success(ctx.node.next_nodes.clone()).with_output(inputs))
    }
}

#[derive(Debug, Default, Deserialize)]
struct EndParams {
    #[serde(default)]
    outputs: BTreeMap<String, Component>,
}

/// Exit of a flow: builds the declared output from the final bindings.
pub struct EndRunner;

#[async_trait]
impl NodeRunner for EndRunner {
    fn node_type(&self) -> &str {
        "end"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("control", "Flow exit; maps bindings to the declared outputs")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        if !node.next_nodes.is_empty() {
            return Err(NodeError::Configuration(
                "end node cannot have next nodes".to_string(),
            ));
        }
        let params: EndParams = parse_params(node)?;
        for component in params.outputs.values() {
            evaluator.prepare(component)?;
        }
        Ok(())
    }

    fn edges(&self, _node: &NodeSpec) -> Result<Vec<String>, NodeError> {
        Ok(Vec::new())
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: EndParams = ctx.params()?;
        let mut output: HashMap<String, Value> = HashMap::new();

        let mut debug_log = Vec::with_capacity(params.outputs.len());
        for (name, component) in &params.outputs {
            let value = ctx.evaluate(component)?;
            debug_log.push(DebugEntry::evaluation(name.as_str(), Ok(&value)));
            output.insert(name.clone(), value);
        }

        for field in &ctx.flow.output_schema {
            if output.contains_key(&field.name) {
                continue;
            }
            let value = ctx
                .data
                .variable(&field.name)
                .cloned()
                .or_else(|| field.default.clone())
                .unwrap_or_default();
            output.insert(field.name.clone(), value);
        }

        for field in &ctx.flow.output_schema {
            let value = output.get(&field.name).cloned().unwrap_or_default();
            field.check(&value)?;
        }

        let output = Value::Object(output);
        ctx.data.set_output(output.clone());
        Ok(VertexResult::terminal()
            .with_output(output)
            .with_debug_log(debug_log))
    }
}
