use async_trait::async_trait;
use flowcore::{NodeError, NodeSpec, Value, VertexResult};
use flowexpr::{Component, ComponentEvaluator};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct HttpParams {
    url: Component,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: BTreeMap<String, Component>,
    #[serde(default)]
    body: Option<Component>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// HTTP request node
pub struct HttpRequestRunner {
    client: reqwest::Client,
}

impl HttpRequestRunner {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for HttpRequestRunner {
    fn node_type(&self) -> &str {
        "http_request"
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("http", "Make HTTP requests")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params: HttpParams = parse_params(node)?;
        if !matches!(
            params.method.to_uppercase().as_str(),
            "GET" | "POST" | "PUT" | "PATCH" | "DELETE"
        ) {
            return Err(NodeError::Configuration(format!(
                "Unsupported method: {}",
                params.method
            )));
        }
        evaluator.prepare(&params.url)?;
        for component in params.headers.values().chain(params.body.as_ref()) {
            evaluator.prepare(component)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: HttpParams = ctx.params()?;

        let url = match ctx.evaluate(&params.url)? {
            Value::String(url) if !url.is_empty() => url,
            other => {
                return Err(NodeError::InvalidInputType {
                    field: "url".to_string(),
                    expected: "string".to_string(),
                    actual: other.type_name().to_string(),
                })
            }
        };
        let method = params.method.to_uppercase();

        ctx.events.info(format!("{} {}", method, url));

        let mut request = match method.as_str() {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "PATCH" => self.client.patch(&url),
            "DELETE" => self.client.delete(&url),
            _ => return Err(NodeError::Configuration(format!("Unsupported method: {}", method))),
        };

        for (key, component) in &params.headers {
            let value = ctx.evaluate(component)?;
            request = request.header(key.as_str(), value.to_display_string());
        }

        if let Some(body) = &params.body {
            request = match ctx.evaluate(body)? {
                Value::Null => request,
                Value::String(text) => request.body(text),
                other => request.json(&serde_json::Value::from(other)),
            };
        }

        if let Some(timeout_ms) = params.timeout_ms {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let response = tokio::select! {
            response = request.send() => response.map_err(|e| {
                if e.is_timeout() {
                    NodeError::Timeout { ms: params.timeout_ms.unwrap_or_default() }
                } else {
                    NodeError::ExecutionFailed(format!("HTTP request failed: {}", e))
                }
            })?,
            _ = ctx.cancellation().cancelled() => return Err(NodeError::Cancelled),
        };

        let status = response.status().as_u16();
        let headers_map: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;
        let body = serde_json::from_str::<serde_json::Value>(&body_text)
            .map(Value::from)
            .unwrap_or(Value::String(body_text));

        ctx.events.data("status", Value::Integer(status as i64));

        let output = Value::object([
            ("status", Value::Integer(status as i64)),
            ("body", body),
            ("headers", Value::Object(headers_map)),
        ]);
        Ok(VertexResult::success(ctx.node.next_nodes.clone()).with_output(output))
    }
}
