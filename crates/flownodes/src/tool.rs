use crate::subflow::{child_data, child_error, finish_child};
use crate::{time, transform};
use async_trait::async_trait;
use flowcore::{FieldSchema, Flow, FlowType, NodeError, NodeSpec, Value, VertexResult};
use flowexpr::{Component, ComponentEvaluator};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A tool implemented in Rust and exposed to flows.
#[async_trait]
pub trait BuiltinTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn inputs(&self) -> Vec<FieldSchema>;

    fn outputs(&self) -> Vec<FieldSchema>;

    /// Called with inputs already checked against `inputs()`. Returns an
    /// object keyed by the declared output names.
    async fn call(&self, inputs: &HashMap<String, Value>) -> Result<Value, NodeError>;
}

/// Node id of the tool call inside a synthetic tool flow.
const CALL_NODE: &str = "call";
const END_NODE: &str = "end";

/// The set of built-in tools, looked up by name.
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: BTreeMap<String, Arc<dyn BuiltinTool>>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every tool shipped with this crate.
    pub fn standard() -> Self {
        let mut tools = Self::new();
        tools.add(Arc::new(time::CurrentTimeTool));
        tools.add(Arc::new(transform::JsonParseTool));
        tools.add(Arc::new(transform::JsonStringifyTool));
        tools.add(Arc::new(transform::TextLengthTool));
        tools
    }

    pub fn add(&mut self, tool: Arc<dyn BuiltinTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn BuiltinTool>> {
        self.tools.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &Arc<dyn BuiltinTool>> {
        self.tools.values()
    }

    /// Wrap a tool as a minimal flow: one `builtin_tool` call feeding an
    /// `end` node that carries the tool's output schema.
    pub fn synthetic_flow(&self, name: &str) -> Option<Flow> {
        let tool = self.get(name)?;

        let outputs: serde_json::Map<String, serde_json::Value> = tool
            .outputs()
            .iter()
            .map(|field| {
                let path = format!("nodes.{}.{}", CALL_NODE, field.name);
                (field.name.clone(), json!({"kind": "reference", "path": path}))
            })
            .collect();

        let mut flow = Flow::new(format!("builtin.{}", name), tool.name(), CALL_NODE)
            .with_type(FlowType::Tool)
            .with_version("v0")
            .with_node(
                NodeSpec::new(CALL_NODE, "builtin_tool")
                    .with_params(json!({ "tool": name }))
                    .with_next([END_NODE]),
            )
            .with_node(NodeSpec::new(END_NODE, "end").with_params(json!({ "outputs": outputs })));
        flow.description = Some(tool.description().to_string());
        for field in tool.inputs() {
            flow = flow.with_input(field);
        }
        for field in tool.outputs() {
            flow = flow.with_output(field);
        }
        Some(flow)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ToolParams {
    tool: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    inputs: BTreeMap<String, Component>,
}

/// Invokes a tool: a built-in one through its synthetic flow, otherwise a
/// loaded flow of type `tool`.
pub struct ToolRunner {
    tools: Arc<ToolBox>,
}

impl ToolRunner {
    pub fn new(tools: Arc<ToolBox>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl NodeRunner for ToolRunner {
    fn node_type(&self) -> &str {
        "tool"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("tool", "Call a built-in or flow-defined tool")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params: ToolParams = parse_params(node)?;
        for component in params.inputs.values() {
            evaluator.prepare(component)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: ToolParams = ctx.params()?;
        let mut child = child_data(ctx, &params.inputs)?;

        let flow = match self.tools.synthetic_flow(&params.tool) {
            Some(flow) => Arc::new(flow),
            None => {
                let flow = ctx
                    .load_flow(&params.tool, params.version.as_deref())
                    .await
                    .map_err(child_error)?;
                if flow.flow_type != FlowType::Tool {
                    return Err(NodeError::ExecutionFailed(format!(
                        "flow '{}' is not a tool",
                        params.tool
                    )));
                }
                flow
            }
        };

        ctx.events.info(format!("Calling tool {}", params.tool));
        let trace = ctx.run_flow(&flow, &mut child).await.map_err(child_error)?;
        finish_child(ctx, &params.tool, trace)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct BuiltinToolParams {
    tool: String,
}

/// Calls the Rust implementation of a built-in tool with the run's inputs.
pub struct BuiltinToolRunner {
    tools: Arc<ToolBox>,
}

impl BuiltinToolRunner {
    pub fn new(tools: Arc<ToolBox>) -> Self {
        Self { tools }
    }

    fn tool(&self, name: &str) -> Result<&Arc<dyn BuiltinTool>, NodeError> {
        self.tools
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("unknown built-in tool '{}'", name)))
    }
}

#[async_trait]
impl NodeRunner for BuiltinToolRunner {
    fn node_type(&self) -> &str {
        "builtin_tool"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("tool", "Body of a built-in tool flow")
    }

    fn validate(&self, node: &NodeSpec, _evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params: BuiltinToolParams = parse_params(node)?;
        self.tool(&params.tool).map(|_| ())
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: BuiltinToolParams = ctx.params()?;
        let tool = self.tool(&params.tool)?;

        let mut inputs = HashMap::new();
        for field in tool.inputs() {
            let value = ctx
                .data
                .input(&field.name)
                .cloned()
                .filter(|v| !v.is_null())
                .or_else(|| field.default.clone())
                .unwrap_or_default();
            field.check(&value)?;
            inputs.insert(field.name.clone(), value);
        }

        let output = tool.call(&inputs).await?;
        Ok(VertexResult::success(ctx.node.next_nodes.clone()).with_output(output))
    }
}
