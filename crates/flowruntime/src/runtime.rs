use crate::loader::FlowLoader;
use crate::validate::ValidationReport;
use crate::{Capabilities, FlowExecutor, NodeRunnerRegistry};
use flowcore::{ExecutionData, ExecutionEvent, Flow, FlowError, RunTrace, WorkflowError};
use flowexpr::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main entry point for running flows
pub struct FlowRuntime {
    executor: FlowExecutor,
}

impl FlowRuntime {
    /// Create a runtime with default settings
    pub fn new(registry: Arc<NodeRunnerRegistry>) -> Self {
        Self::with_config(registry, RuntimeConfig::default())
    }

    pub fn with_config(registry: Arc<NodeRunnerRegistry>, config: RuntimeConfig) -> Self {
        Self {
            executor: FlowExecutor::new(registry, config),
        }
    }

    /// Source used for sub-flows and `execute_code`
    pub fn with_loader(mut self, loader: Arc<dyn FlowLoader>) -> Self {
        self.executor = self.executor.with_loader(loader);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.executor = self.executor.with_capabilities(capabilities);
        self
    }

    pub fn registry(&self) -> &Arc<NodeRunnerRegistry> {
        self.executor.registry()
    }

    pub fn executor(&self) -> &FlowExecutor {
        &self.executor
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.executor.config()
    }

    pub fn validate(&self, flow: &Flow) -> Result<ValidationReport, WorkflowError> {
        self.executor.validate(flow)
    }

    /// Execute a flow directly
    pub async fn execute(
        &self,
        flow: &Flow,
        data: &mut ExecutionData,
        cancellation: CancellationToken,
    ) -> Result<RunTrace, FlowError> {
        self.executor.execute(flow, data, cancellation).await
    }

    /// Load a flow by code from the configured loader and execute it
    pub async fn execute_code(
        &self,
        code: &str,
        version: Option<&str>,
        data: &mut ExecutionData,
        cancellation: CancellationToken,
    ) -> Result<RunTrace, FlowError> {
        let flow = self.executor.loader().load_flow(code, version).await?;
        self.executor.execute(&flow, data, cancellation).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.executor.event_bus().subscribe()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound for loop nodes that do not set their own.
    pub max_loop_iterations: usize,
    pub max_flow_depth: usize,
    pub event_buffer_size: usize,
    /// Nodes running longer than this are logged; nothing is interrupted.
    pub slow_node_warn_ms: u64,
    pub sandbox: SandboxConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 100,
            max_flow_depth: 8,
            event_buffer_size: 1000,
            slow_node_warn_ms: 10_000,
            sandbox: SandboxConfig::default(),
        }
    }
}
