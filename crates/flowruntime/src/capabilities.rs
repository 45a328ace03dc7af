use async_trait::async_trait;
use flowcore::NodeError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub usage: ModelUsage,
}

/// Model invocation backend, injected by the host.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, NodeError>;

    fn name(&self) -> &str;
}

/// Offline adapter that answers with the prompt itself.
#[derive(Debug, Default, Clone)]
pub struct EchoModelAdapter;

#[async_trait]
impl ModelAdapter for EchoModelAdapter {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, NodeError> {
        let prompt_tokens = request.prompt.split_whitespace().count() as u32;
        Ok(ModelResponse {
            text: format!("[Echo] {}", request.prompt),
            model: request.model.unwrap_or_else(|| "echo".to_string()),
            usage: ModelUsage {
                prompt_tokens,
                completion_tokens: prompt_tokens + 1,
            },
        })
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// External collaborators a runner may call into. Absent adapters make the
/// runners that need them fail on the node, not the run.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub model: Option<Arc<dyn ModelAdapter>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Arc<dyn ModelAdapter>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn model(&self) -> Result<&Arc<dyn ModelAdapter>, NodeError> {
        self.model
            .as_ref()
            .ok_or_else(|| NodeError::Adapter("no model adapter configured".to_string()))
    }
}
