use async_trait::async_trait;
use flowcore::{
    ErrorHandling, ExecutionData, Flow, FlowError, NodeError, NodeSpec, Operator, RunStatus, Trigger,
    TriggerType, Value, VertexResult, WorkflowError,
};
use flowruntime::{
    FlowExecutor, InMemoryFlowLoader, NodeContext, NodeRunner, NodeRunnerRegistry, RuntimeConfig,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Continues to every `next_nodes` entry and records its own id.
struct PassRunner;

#[async_trait]
impl NodeRunner for PassRunner {
    fn node_type(&self) -> &str {
        "pass"
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let seen = ctx.data.variable("seen").cloned().unwrap_or(Value::Integer(0));
        ctx.data
            .set_variable("seen", Value::Integer(seen.as_i64().unwrap_or(0) + 1));
        Ok(VertexResult::success(ctx.node.next_nodes.clone())
            .with_output(json!({"visited": ctx.node.node_id})))
    }
}

struct FailRunner;

#[async_trait]
impl NodeRunner for FailRunner {
    fn node_type(&self) -> &str {
        "fail"
    }

    async fn execute(&self, _ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        Err(NodeError::ExecutionFailed("boom".to_string()))
    }
}

struct FatalRunner;

#[async_trait]
impl NodeRunner for FatalRunner {
    fn node_type(&self) -> &str {
        "fatal"
    }

    async fn execute(&self, _ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        Err(NodeError::Configuration("bad params".to_string()))
    }
}

/// Cancels the run, then asks to continue.
struct CancelRunner;

#[async_trait]
impl NodeRunner for CancelRunner {
    fn node_type(&self) -> &str {
        "cancel"
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        ctx.cancellation().cancel();
        Ok(VertexResult::success(ctx.node.next_nodes.clone()))
    }
}

#[derive(Deserialize)]
struct RepeatParams {
    body: String,
    times: usize,
}

/// Runs its body scope a fixed number of times.
struct RepeatRunner;

#[async_trait]
impl NodeRunner for RepeatRunner {
    fn node_type(&self) -> &str {
        "repeat"
    }

    fn body_entries(&self, node: &NodeSpec) -> Result<Vec<String>, NodeError> {
        let params: RepeatParams = flowruntime::parse_params(node)?;
        Ok(vec![params.body])
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: RepeatParams = ctx.params()?;
        for i in 0..params.times {
            ctx.run_body(&params.body, i)
                .await
                .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;
        }
        Ok(VertexResult::success(ctx.node.next_nodes.clone()))
    }
}

#[derive(Deserialize)]
struct CallParams {
    code: String,
}

/// Calls another flow through the loader.
struct CallRunner;

#[async_trait]
impl NodeRunner for CallRunner {
    fn node_type(&self) -> &str {
        "call"
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params: CallParams = ctx.params()?;
        let trigger = Trigger::new(TriggerType::SubFlow {
            parent_code: ctx.flow.code.clone(),
            parent_node: ctx.node.node_id.clone(),
        });
        let mut child = ExecutionData::new(trigger, ctx.data.operator().clone(), HashMap::new());
        let trace = ctx
            .run_sub_flow(&params.code, None, &mut child)
            .await
            .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;
        Ok(VertexResult::success(ctx.node.next_nodes.clone()).with_output(trace.len()))
    }
}

/// Reports the node that enqueued it and that node's recorded result.
struct InspectRunner;

#[async_trait]
impl NodeRunner for InspectRunner {
    fn node_type(&self) -> &str {
        "inspect"
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let from = ctx.triggered_by().map(str::to_string);
        let upstream = from
            .as_deref()
            .and_then(|id| ctx.upstream(id))
            .and_then(|result| result.output.clone())
            .unwrap_or_default();
        Ok(VertexResult::success(ctx.node.next_nodes.clone()).with_output(Value::object([
            ("from", from.map(Value::String).unwrap_or_default()),
            ("upstream", upstream),
        ])))
    }
}

fn registry() -> Arc<NodeRunnerRegistry> {
    let mut registry = NodeRunnerRegistry::new();
    registry.register(Arc::new(PassRunner));
    registry.register(Arc::new(FailRunner));
    registry.register(Arc::new(FatalRunner));
    registry.register(Arc::new(CancelRunner));
    registry.register(Arc::new(RepeatRunner));
    registry.register(Arc::new(CallRunner));
    registry.register(Arc::new(InspectRunner));
    Arc::new(registry)
}

fn executor() -> FlowExecutor {
    FlowExecutor::new(registry(), RuntimeConfig::default())
}

fn data() -> ExecutionData {
    ExecutionData::new(Trigger::manual(), Operator::user("tester"), HashMap::new())
}

#[tokio::test]
async fn test_fan_out_runs_in_fifo_order() {
    let flow = Flow::new("fan", "Fan out", "a")
        .with_node(NodeSpec::new("a", "pass").with_next(["b", "c"]))
        .with_node(NodeSpec::new("b", "pass").with_next(["d"]))
        .with_node(NodeSpec::new("c", "pass"))
        .with_node(NodeSpec::new("d", "pass"));

    let mut data = data();
    let trace = executor()
        .execute(&flow, &mut data, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(trace.visited(), vec!["a", "b", "c", "d"]);
    assert_eq!(trace.status, RunStatus::Succeeded);
    assert_eq!(trace.entries[3].triggered_by.as_deref(), Some("b"));
    assert_eq!(data.variable("seen"), Some(&Value::Integer(4)));
    assert_eq!(
        data.lookup("nodes.c.visited"),
        Some(Value::String("c".to_string()))
    );
}

#[tokio::test]
async fn test_runner_sees_triggering_node_and_its_result() {
    let flow = Flow::new("chain", "Chain", "a")
        .with_node(NodeSpec::new("a", "pass").with_next(["check"]))
        .with_node(NodeSpec::new("check", "inspect").with_next(["again"]))
        .with_node(NodeSpec::new("again", "inspect"));

    let trace = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        trace.latest("check").unwrap().output,
        Some(Value::from(json!({"from": "a", "upstream": {"visited": "a"}})))
    );
    assert_eq!(
        trace.latest("again").unwrap().output,
        Some(Value::from(json!({
            "from": "check",
            "upstream": {"from": "a", "upstream": {"visited": "a"}}
        })))
    );
}

#[tokio::test]
async fn test_entry_node_has_no_trigger() {
    let flow = Flow::new("single", "Single", "only").with_node(NodeSpec::new("only", "inspect"));
    let trace = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        trace.latest("only").unwrap().output,
        Some(Value::from(json!({"from": null, "upstream": null})))
    );
}

#[tokio::test]
async fn test_unknown_node_type_fails_before_any_node_runs() {
    let flow = Flow::new("broken", "Broken", "a")
        .with_node(NodeSpec::new("a", "pass").with_next(["b"]))
        .with_node(NodeSpec::new("b", "does_not_exist"));

    let mut data = data();
    let err = executor()
        .execute(&flow, &mut data, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(matches!(
        err,
        FlowError::Workflow(WorkflowError::UnknownNodeType { ref node_type, .. }) if node_type == "does_not_exist"
    ));
    assert!(data.variable("seen").is_none());
    assert!(data.node_output("a").is_none());
}

#[tokio::test]
async fn test_dangling_next_node_is_rejected() {
    let flow = Flow::new("dangling", "Dangling", "a")
        .with_node(NodeSpec::new("a", "pass").with_next(["ghost"]));

    let err = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::Workflow(WorkflowError::DanglingReference { .. })
    ));
}

#[tokio::test]
async fn test_recoverable_failure_is_recorded_and_path_stops() {
    let flow = Flow::new("partial", "Partial", "a")
        .with_node(NodeSpec::new("a", "pass").with_next(["bad", "ok"]))
        .with_node(NodeSpec::new("bad", "fail").with_next(["after_bad"]))
        .with_node(NodeSpec::new("after_bad", "pass"))
        .with_node(NodeSpec::new("ok", "pass"));

    let trace = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(trace.visited(), vec!["a", "bad", "ok"]);
    assert_eq!(trace.status, RunStatus::PartiallyFailed);
    let failure = trace.latest("bad").unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, "execution_failed");
    assert_eq!(trace.failures().count(), 1);
}

#[tokio::test]
async fn test_continue_policy_follows_static_edges() {
    let flow = Flow::new("continue", "Continue", "bad")
        .with_node(
            NodeSpec::new("bad", "fail")
                .with_next(["next"])
                .with_on_error(ErrorHandling::Continue),
        )
        .with_node(NodeSpec::new("next", "pass"));

    let trace = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(trace.visited(), vec!["bad", "next"]);
    assert_eq!(trace.status, RunStatus::PartiallyFailed);
}

#[tokio::test]
async fn test_abort_policy_fails_the_run() {
    let mut flow = Flow::new("abort", "Abort", "bad")
        .with_node(NodeSpec::new("bad", "fail").with_next(["next"]))
        .with_node(NodeSpec::new("next", "pass"));
    flow.settings.on_error = ErrorHandling::Abort;

    let err = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Node(NodeError::ExecutionFailed(_))));
}

#[tokio::test]
async fn test_fatal_runner_error_unwinds() {
    let flow = Flow::new("fatal", "Fatal", "a")
        .with_node(NodeSpec::new("a", "pass").with_next(["b"]))
        .with_node(NodeSpec::new("b", "fatal"));

    let err = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Node(NodeError::Configuration(_))));
}

#[tokio::test]
async fn test_body_scope_runs_per_iteration() {
    let flow = Flow::new("scoped", "Scoped", "loop")
        .with_node(
            NodeSpec::new("loop", "repeat")
                .with_params(json!({"body": "x", "times": 3}))
                .with_next(["after"]),
        )
        .with_node(NodeSpec::new("x", "pass").with_parent("loop").with_next(["y"]))
        .with_node(NodeSpec::new("y", "pass").with_parent("loop"))
        .with_node(NodeSpec::new("after", "pass"));

    let trace = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        trace.visited(),
        vec!["x", "y", "x", "y", "x", "y", "loop", "after"]
    );
    assert_eq!(trace.visits("after"), 1);
    assert_eq!(trace.entries[4].scope.as_deref(), Some("loop"));
    assert_eq!(trace.entries[4].iteration, Some(2));
    assert_eq!(trace.entries[7].scope, None);
}

#[tokio::test]
async fn test_edge_across_scopes_is_rejected() {
    let flow = Flow::new("leaky", "Leaky", "loop")
        .with_node(
            NodeSpec::new("loop", "repeat")
                .with_params(json!({"body": "x", "times": 1}))
                .with_next(["after"]),
        )
        .with_node(NodeSpec::new("x", "pass").with_parent("loop").with_next(["after"]))
        .with_node(NodeSpec::new("after", "pass"));

    let err = executor()
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::Workflow(WorkflowError::ScopeViolation { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_token_stops_before_first_node() {
    let flow = Flow::new("one", "One", "a").with_node(NodeSpec::new("a", "pass"));
    let token = CancellationToken::new();
    token.cancel();

    let mut data = data();
    let err = executor().execute(&flow, &mut data, token).await.unwrap_err();
    assert!(matches!(err, FlowError::Cancelled));
    assert!(data.node_output("a").is_none());
}

#[tokio::test]
async fn test_cancellation_is_checked_on_every_pop() {
    let flow = Flow::new("cancel", "Cancel", "a")
        .with_node(NodeSpec::new("a", "cancel").with_next(["b"]))
        .with_node(NodeSpec::new("b", "pass"));

    let mut data = data();
    let err = executor()
        .execute(&flow, &mut data, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Cancelled));
    assert!(data.node_output("b").is_none());
}

#[tokio::test]
async fn test_sub_flow_recursion_is_bounded_by_depth() {
    let loader = Arc::new(InMemoryFlowLoader::new());
    let flow = Flow::new("rec", "Recursive", "call")
        .with_node(NodeSpec::new("call", "call").with_params(json!({"code": "rec"})));
    loader.insert(flow.clone()).await;

    let config = RuntimeConfig {
        max_flow_depth: 2,
        ..RuntimeConfig::default()
    };
    let executor = FlowExecutor::new(registry(), config).with_loader(loader);

    let trace = executor
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap();

    // depth 0 and 1 succeed, the call at depth 2 fails on the nesting limit
    assert_eq!(trace.status, RunStatus::Succeeded);
    assert_eq!(trace.latest("call").unwrap().output, Some(Value::Integer(1)));
}

#[tokio::test]
async fn test_events_are_published() {
    let flow = Flow::new("events", "Events", "a").with_node(NodeSpec::new("a", "pass"));
    let executor = executor();
    let mut events = executor.event_bus().subscribe();

    executor
        .execute(&flow, &mut data(), CancellationToken::new())
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(serde_json::to_value(&event).unwrap()["type"].clone());
    }
    assert_eq!(
        kinds,
        vec![
            json!("RunStarted"),
            json!("NodeStarted"),
            json!("NodeCompleted"),
            json!("RunCompleted")
        ]
    );
}
