use crate::tool::BuiltinTool;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use flowcore::{FieldSchema, FieldType, NodeError, Value, VertexResult};
use flowruntime::{NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

fn default_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize)]
struct DelayParams {
    #[serde(default = "default_delay_ms")]
    delay_ms: u64,
}

/// Delay execution for a specified duration
pub struct DelayRunner;

#[async_trait]
impl NodeRunner for DelayRunner {
    fn node_type(&self) -> &str {
        "delay"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("time", "Delay execution for specified milliseconds")
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: DelayParams = ctx.params()?;

        ctx.events.info(format!("Delaying for {}ms", params.delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(params.delay_ms)) => {}
            _ = ctx.cancellation().cancelled() => return Err(NodeError::Cancelled),
        }

        Ok(VertexResult::success(ctx.node.next_nodes.clone())
            .with_output(Value::object([("delayed_ms", Value::Integer(params.delay_ms as i64))])))
    }
}

/// Current UTC time.
pub struct CurrentTimeTool;

#[async_trait]
impl BuiltinTool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Current UTC time as RFC 3339 text and unix milliseconds"
    }

    fn inputs(&self) -> Vec<FieldSchema> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("iso", FieldType::String),
            FieldSchema::new("timestamp_ms", FieldType::Integer),
        ]
    }

    async fn call(&self, _inputs: &HashMap<String, Value>) -> Result<Value, NodeError> {
        let now = Utc::now();
        Ok(Value::object([
            ("iso", Value::from(now.to_rfc3339_opts(SecondsFormat::Millis, true))),
            ("timestamp_ms", Value::Integer(now.timestamp_millis())),
        ]))
    }
}
