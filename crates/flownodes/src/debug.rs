use async_trait::async_trait;
use flowcore::{DebugEntry, NodeError, NodeSpec, Value, VertexResult};
use flowexpr::{Component, ComponentEvaluator};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LogParams {
    message: Component,
    #[serde(default)]
    level: LogLevel,
}

/// Logs a rendered message as an event and a tracing line
pub struct LogRunner;

#[async_trait]
impl NodeRunner for LogRunner {
    fn node_type(&self) -> &str {
        "log"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("debug", "Log a message for debugging")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params: LogParams = parse_params(node)?;
        Ok(evaluator.prepare(&params.message)?)
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: LogParams = ctx.params()?;
        let message = ctx.evaluate(&params.message)?.to_display_string();

        match params.level {
            LogLevel::Debug => tracing::debug!(node = %ctx.node.node_id, "{}", message),
            LogLevel::Info => tracing::info!(node = %ctx.node.node_id, "{}", message),
            LogLevel::Warn => tracing::warn!(node = %ctx.node.node_id, "{}", message),
        }
        match params.level {
            LogLevel::Warn => ctx.events.warn(message.clone()),
            _ => ctx.events.info(message.clone()),
        }

        Ok(VertexResult::success(ctx.node.next_nodes.clone())
            .with_output(Value::object([("message", Value::from(message.clone()))]))
            .with_debug(DebugEntry::message(params.level.as_str(), message)))
    }
}
