use crate::loader::{FlowLoader, InMemoryFlowLoader};
use crate::runner::{run_node, Frame, NodeContext};
use crate::validate::{validate_flow, ValidationReport};
use crate::{Capabilities, NodeRunnerRegistry, RuntimeConfig};
use chrono::Utc;
use flowcore::{
    EventBus, ExecutionData, ExecutionEvent, Flow, FlowError, NodeId, RunTrace, TraceEntry,
    WorkflowError,
};
use flowexpr::{ComponentEvaluator, Sandbox};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs flows as a sequential worklist over their nodes.
#[derive(Clone)]
pub struct FlowExecutor {
    registry: Arc<NodeRunnerRegistry>,
    evaluator: ComponentEvaluator,
    loader: Arc<dyn FlowLoader>,
    capabilities: Capabilities,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl FlowExecutor {
    pub fn new(registry: Arc<NodeRunnerRegistry>, config: RuntimeConfig) -> Self {
        let sandbox = Arc::new(Sandbox::new(config.sandbox.clone()));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            registry,
            evaluator: ComponentEvaluator::new(sandbox),
            loader: Arc::new(InMemoryFlowLoader::new()),
            capabilities: Capabilities::default(),
            event_bus,
            config,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn FlowLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRunnerRegistry> {
        &self.registry
    }

    pub fn evaluator(&self) -> &ComponentEvaluator {
        &self.evaluator
    }

    pub fn loader(&self) -> &Arc<dyn FlowLoader> {
        &self.loader
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn validate(&self, flow: &Flow) -> Result<ValidationReport, WorkflowError> {
        validate_flow(flow, &self.registry, &self.evaluator)
    }

    /// Run a flow to completion.
    ///
    /// Configuration errors surface before any node runs. Recoverable node
    /// failures are recorded in the returned trace; fatal ones abort the run.
    pub async fn execute(
        &self,
        flow: &Flow,
        data: &mut ExecutionData,
        cancellation: CancellationToken,
    ) -> Result<RunTrace, FlowError> {
        self.execute_at_depth(flow, data, &cancellation, 0).await
    }

    pub(crate) async fn execute_at_depth(
        &self,
        flow: &Flow,
        data: &mut ExecutionData,
        cancellation: &CancellationToken,
        depth: usize,
    ) -> Result<RunTrace, FlowError> {
        if depth > self.config.max_flow_depth {
            return Err(FlowError::Execution(format!(
                "flow '{}' exceeds maximum nesting depth of {}",
                flow.code, self.config.max_flow_depth
            )));
        }

        self.validate(flow)?;

        let mut trace = RunTrace::new(flow.code.clone(), flow.version.clone());
        let run_id = trace.run_id;
        let start_time = Instant::now();

        self.event_bus.emit(ExecutionEvent::RunStarted {
            run_id,
            flow_code: flow.code.clone(),
            depth,
            timestamp: Utc::now(),
        });
        tracing::info!(%run_id, depth, "Starting flow execution: {}", flow.code);

        let outcome = self
            .run_scope(flow, &flow.entry, &Frame::root(depth), data, &mut trace, cancellation)
            .await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let status = match &outcome {
            Ok(()) => trace.status.as_str(),
            Err(FlowError::Cancelled) => "cancelled",
            Err(_) => "failed",
        };
        self.event_bus.emit(ExecutionEvent::RunCompleted {
            run_id,
            flow_code: flow.code.clone(),
            status: status.to_string(),
            nodes_executed: trace.len(),
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(
            %run_id,
            nodes = trace.len(),
            duration_ms,
            "Flow {} finished: {}",
            flow.code,
            status
        );

        outcome?;
        trace.output = data.output().cloned();
        Ok(trace)
    }

    /// Drain a worklist seeded with `entry`, restricted to the nodes of the
    /// frame's scope. Results are appended to `trace` in execution order.
    pub(crate) async fn run_scope(
        &self,
        flow: &Flow,
        entry: &str,
        frame: &Frame,
        data: &mut ExecutionData,
        trace: &mut RunTrace,
        cancellation: &CancellationToken,
    ) -> Result<(), FlowError> {
        let run_id = trace.run_id;
        let mut worklist: VecDeque<(NodeId, Option<NodeId>)> = VecDeque::new();
        worklist.push_back((entry.to_string(), None));

        while let Some((node_id, triggered_by)) = worklist.pop_front() {
            if cancellation.is_cancelled() {
                tracing::info!(%run_id, "Run cancelled before node {}", node_id);
                return Err(FlowError::Cancelled);
            }

            let node = flow
                .find_node(&node_id)
                .ok_or_else(|| WorkflowError::NodeNotFound(node_id.clone()))?;
            if node.parent_id != frame.scope {
                return Err(WorkflowError::ScopeViolation {
                    from: triggered_by.unwrap_or_default(),
                    to: node_id,
                }
                .into());
            }

            let (version, runner) = self.registry.resolve_node(node)?;
            let version = version.to_string();

            self.event_bus.emit(ExecutionEvent::NodeStarted {
                run_id,
                node_id: node.node_id.clone(),
                node_type: node.node_type.clone(),
                timestamp: Utc::now(),
            });
            tracing::debug!(%run_id, node_type = %node.node_type, %version, "Running node {}", node.label());

            let started_at = Utc::now();
            let start = Instant::now();
            let outcome = {
                let events = self.event_bus.emitter(run_id, node.node_id.clone());
                let mut ctx = NodeContext::new(
                    node,
                    flow,
                    &mut *data,
                    &mut *trace,
                    self,
                    cancellation,
                    frame,
                    triggered_by.as_deref(),
                    events,
                );
                run_node(runner.as_ref(), &mut ctx).await
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    self.event_bus.emit(ExecutionEvent::NodeFailed {
                        run_id,
                        node_id: node.node_id.clone(),
                        error: err.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(err);
                }
            };

            if duration_ms > self.config.slow_node_warn_ms {
                tracing::warn!(
                    %run_id,
                    duration_ms,
                    "Node {} held the run for an unusually long time",
                    node.node_id
                );
            }

            if let Some(output) = &result.output {
                data.set_node_output(node.node_id.clone(), output.clone());
            }

            match &result.error {
                None => self.event_bus.emit(ExecutionEvent::NodeCompleted {
                    run_id,
                    node_id: node.node_id.clone(),
                    children: result.children_ids.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                }),
                Some(failure) => self.event_bus.emit(ExecutionEvent::NodeFailed {
                    run_id,
                    node_id: node.node_id.clone(),
                    error: failure.message.clone(),
                    timestamp: Utc::now(),
                }),
            }

            for child in &result.children_ids {
                worklist.push_back((child.clone(), Some(node.node_id.clone())));
            }

            trace.record(TraceEntry {
                seq: 0,
                node_id: node.node_id.clone(),
                node_type: node.node_type.clone(),
                version,
                scope: frame.scope.clone(),
                iteration: frame.iteration,
                triggered_by,
                depth: frame.depth,
                started_at,
                duration_ms,
                result,
            });
        }

        Ok(())
    }

    /// Load a flow through the loader and run it one level deeper.
    pub(crate) async fn run_sub_flow(
        &self,
        code: &str,
        version: Option<&str>,
        data: &mut ExecutionData,
        cancellation: &CancellationToken,
        depth: usize,
    ) -> Result<RunTrace, FlowError> {
        let flow = self.loader.load_flow(code, version).await?;
        self.execute_at_depth(&flow, data, cancellation, depth).await
    }
}
