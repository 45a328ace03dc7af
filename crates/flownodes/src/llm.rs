use async_trait::async_trait;
use flowcore::{NodeError, NodeSpec, Value, VertexResult};
use flowexpr::{Component, ComponentEvaluator};
use flowruntime::{parse_params, ModelRequest, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct LlmParams {
    prompt: Component,
    #[serde(default)]
    system: Option<Component>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

/// Calls the injected model adapter with a rendered prompt.
pub struct LlmRunner;

#[async_trait]
impl NodeRunner for LlmRunner {
    fn node_type(&self) -> &str {
        "llm"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("ai", "Complete a prompt with the configured model")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params: LlmParams = parse_params(node)?;
        evaluator.prepare(&params.prompt)?;
        if let Some(system) = &params.system {
            evaluator.prepare(system)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: LlmParams = ctx.params()?;

        let prompt = ctx.evaluate(&params.prompt)?.to_display_string();
        let system = match &params.system {
            Some(system) => Some(ctx.evaluate(system)?.to_display_string()),
            None => None,
        };

        let adapter = ctx.capabilities().model()?.clone();
        tracing::debug!(
            node = %ctx.node.node_id,
            adapter = adapter.name(),
            "Calling model"
        );

        let request = ModelRequest {
            model: params.model,
            system,
            prompt,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };
        let response = tokio::select! {
            response = adapter.complete(request) => response?,
            _ = ctx.cancellation().cancelled() => return Err(NodeError::Cancelled),
        };

        let output = Value::object([
            ("text", Value::from(response.text)),
            ("model", Value::from(response.model)),
            (
                "usage",
                Value::object([
                    ("prompt_tokens", Value::Integer(response.usage.prompt_tokens as i64)),
                    (
                        "completion_tokens",
                        Value::Integer(response.usage.completion_tokens as i64),
                    ),
                ]),
            ),
        ]);
        Ok(VertexResult::success(ctx.node.next_nodes.clone()).with_output(output))
    }
}
