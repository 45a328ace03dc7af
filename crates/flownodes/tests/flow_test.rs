use flowcore::{
    DebugEntry, ExecutionData, Flow, FlowError, Operator, RunStatus, Trigger, Value,
};
use flowruntime::{Capabilities, EchoModelAdapter, FlowRuntime, InMemoryFlowLoader};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn flow(value: serde_json::Value) -> Flow {
    serde_json::from_value(value).unwrap()
}

fn data(inputs: serde_json::Value) -> ExecutionData {
    let inputs: HashMap<String, Value> = match Value::from(inputs) {
        Value::Object(map) => map,
        _ => HashMap::new(),
    };
    ExecutionData::new(Trigger::manual(), Operator::user("tester"), inputs)
}

fn reference(path: &str) -> serde_json::Value {
    json!({"kind": "reference", "path": path})
}

fn double_flow() -> Flow {
    flow(json!({
        "code": "double",
        "name": "Double a number",
        "type": "sub_flow",
        "entry": "start",
        "input_schema": [{"name": "n", "type": "integer", "required": true}],
        "output_schema": [{"name": "result", "type": "integer", "required": true}],
        "nodes": [
            {"node_id": "start", "type": "start", "next_nodes": ["calc"]},
            {"node_id": "calc", "type": "code", "next_nodes": ["end"], "params": {
                "script": "n * 2",
                "inputs": {"n": reference("input.n")}
            }},
            {"node_id": "end", "type": "end", "params": {"outputs": {"result": reference("nodes.calc")}}}
        ]
    }))
}

fn shout_tool() -> Flow {
    flow(json!({
        "code": "shout",
        "name": "Shout",
        "type": "tool",
        "entry": "start",
        "input_schema": [{"name": "text", "type": "string", "required": true}],
        "nodes": [
            {"node_id": "start", "type": "start", "next_nodes": ["upper"]},
            {"node_id": "upper", "type": "code", "next_nodes": ["end"], "params": {
                "script": "text.to_upper()",
                "inputs": {"text": reference("input.text")}
            }},
            {"node_id": "end", "type": "end", "params": {"outputs": {"loud": reference("nodes.upper")}}}
        ]
    }))
}

async fn runtime_with_flows() -> FlowRuntime {
    let loader = Arc::new(InMemoryFlowLoader::new());
    loader.insert(double_flow()).await;
    loader.insert(shout_tool()).await;
    FlowRuntime::new(flownodes::default_registry())
        .with_loader(loader)
        .with_capabilities(Capabilities::new().with_model(Arc::new(EchoModelAdapter)))
}

fn single_node(node: serde_json::Value) -> Flow {
    flow(json!({
        "code": "single",
        "name": "Single node",
        "entry": "node",
        "nodes": [node]
    }))
}

#[tokio::test]
async fn test_sub_flow_output_is_published_on_the_calling_node() {
    let parent = flow(json!({
        "code": "parent",
        "name": "Parent",
        "entry": "call",
        "nodes": [
            {"node_id": "call", "type": "sub_flow", "next_nodes": ["after"], "params": {
                "flow": "double",
                "inputs": {"n": reference("input.value")}
            }},
            {"node_id": "after", "type": "assign", "params": {"assignments": [
                {"variable": "answer", "value": reference("nodes.call.result")}
            ]}}
        ]
    }));

    let runtime = runtime_with_flows().await;
    let mut data = data(json!({"value": 21}));
    let trace = runtime
        .execute(&parent, &mut data, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(trace.status, RunStatus::Succeeded);
    let call = trace.latest("call").unwrap();
    assert_eq!(call.output, Some(Value::from(json!({"result": 42}))));
    assert!(matches!(
        &call.debug_log[0],
        DebugEntry::SubFlow { code, status, nodes: 3, .. }
            if code == "double" && status == "succeeded"
    ));
    assert_eq!(data.variable("answer"), Some(&Value::Integer(42)));
    // the child's nodes do not leak into the parent trace
    assert_eq!(trace.visited(), vec!["call", "after"]);
}

#[tokio::test]
async fn test_missing_sub_flow_fails_only_the_calling_node() {
    let parent = single_node(json!({
        "node_id": "node", "type": "sub_flow", "params": {"flow": "nowhere"}
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&parent, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(trace.status, RunStatus::PartiallyFailed);
    let failure = trace.latest("node").unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, "execution_failed");
    assert!(failure.message.contains("nowhere"));
}

#[tokio::test]
async fn test_child_with_missing_required_input_fails_the_caller() {
    let parent = single_node(json!({
        "node_id": "node", "type": "sub_flow", "params": {"flow": "double"}
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&parent, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    let failure = trace.latest("node").unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, "execution_failed");
    assert!(failure.message.contains("start"));
}

#[tokio::test]
async fn test_execute_code_runs_a_loaded_flow() {
    let runtime = runtime_with_flows().await;
    let trace = runtime
        .execute_code("double", None, &mut data(json!({"n": 5})), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(trace.output, Some(Value::from(json!({"result": 10}))));
}

#[tokio::test]
async fn test_builtin_tool_runs_through_a_tool_flow() {
    let caller = single_node(json!({
        "node_id": "node", "type": "tool", "params": {
            "tool": "text_length",
            "inputs": {"text": {"kind": "constant", "value": "one two three"}}
        }
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&caller, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        trace.latest("node").unwrap().output,
        Some(Value::from(json!({"chars": 13, "words": 3})))
    );
}

#[tokio::test]
async fn test_flow_defined_tool_is_loaded_by_code() {
    let caller = single_node(json!({
        "node_id": "node", "type": "tool", "params": {
            "tool": "shout",
            "inputs": {"text": {"kind": "constant", "value": "hey"}}
        }
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&caller, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        trace.latest("node").unwrap().output,
        Some(Value::from(json!({"loud": "HEY"})))
    );
}

#[tokio::test]
async fn test_non_tool_flow_cannot_be_called_as_tool() {
    let caller = single_node(json!({
        "node_id": "node", "type": "tool", "params": {"tool": "double"}
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&caller, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    let failure = trace.latest("node").unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, "execution_failed");
    assert!(failure.message.contains("not a tool"));
}

#[tokio::test]
async fn test_builtin_tool_flow_is_well_formed() {
    let tools = flownodes::ToolBox::standard();
    let synthetic = tools.synthetic_flow("json_stringify").unwrap();
    let runtime = runtime_with_flows().await;

    let report = runtime.validate(&synthetic).unwrap();
    assert!(report.is_clean());
    assert_eq!(synthetic.code, "builtin.json_stringify");
    assert!(tools.synthetic_flow("teleport").is_none());
}

#[tokio::test]
async fn test_llm_node_uses_the_model_adapter() {
    let node = single_node(json!({
        "node_id": "node", "type": "llm", "params": {
            "prompt": {"kind": "template", "template": "Hi {{input.name}}"}
        }
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&node, &mut data(json!({"name": "Ann"})), CancellationToken::new())
        .await
        .unwrap();

    let output = trace.latest("node").unwrap().output.clone().unwrap();
    assert_eq!(output.get_path(&["text"]), Some(&Value::from("[Echo] Hi Ann")));
    assert_eq!(output.get_path(&["model"]), Some(&Value::from("echo")));
    assert_eq!(
        output.get_path(&["usage", "prompt_tokens"]),
        Some(&Value::Integer(2))
    );
}

#[tokio::test]
async fn test_llm_without_adapter_fails_the_node() {
    let node = single_node(json!({
        "node_id": "node", "type": "llm", "params": {
            "prompt": {"kind": "constant", "value": "hello"}
        }
    }));
    let trace = FlowRuntime::new(flownodes::default_registry())
        .execute(&node, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(trace.latest("node").unwrap().error.as_ref().unwrap().kind, "adapter");
}

#[tokio::test]
async fn test_code_runtime_error_is_an_evaluation_failure() {
    let node = single_node(json!({
        "node_id": "node", "type": "code", "params": {"script": "no_such_function(1)"}
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&node, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        trace.latest("node").unwrap().error.as_ref().unwrap().kind,
        "evaluation"
    );
}

#[tokio::test]
async fn test_code_cannot_see_unmapped_data() {
    let node = single_node(json!({
        "node_id": "node", "type": "code", "params": {"script": "input.secret"}
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&node, &mut data(json!({"secret": 1})), CancellationToken::new())
        .await
        .unwrap();

    assert!(!trace.latest("node").unwrap().is_success());
}

#[tokio::test]
async fn test_start_fills_defaults_and_rejects_missing_inputs() {
    let greeting = flow(json!({
        "code": "greeting",
        "name": "Greeting",
        "entry": "start",
        "input_schema": [
            {"name": "name", "type": "string", "required": true},
            {"name": "punctuation", "type": "string", "default": "!"}
        ],
        "output_schema": [{"name": "text", "type": "string", "required": true}],
        "nodes": [
            {"node_id": "start", "type": "start", "next_nodes": ["end"]},
            {"node_id": "end", "type": "end", "params": {"outputs": {
                "text": {"kind": "template", "template": "Hello {{input.name}}{{input.punctuation}}"}
            }}}
        ]
    }));
    let runtime = runtime_with_flows().await;

    let trace = runtime
        .execute(&greeting, &mut data(json!({"name": "Ann"})), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(trace.output, Some(Value::from(json!({"text": "Hello Ann!"}))));
    assert_eq!(
        trace.latest("end").unwrap().debug_log,
        vec![DebugEntry::Evaluation {
            label: "text".to_string(),
            value: Value::from("Hello Ann!"),
            error: None,
        }]
    );

    let trace = runtime
        .execute(&greeting, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(trace.status, RunStatus::PartiallyFailed);
    assert_eq!(
        trace.latest("start").unwrap().error.as_ref().unwrap().kind,
        "missing_input"
    );
    assert_eq!(trace.visits("end"), 0);
    assert_eq!(trace.output, None);

    let trace = runtime
        .execute(&greeting, &mut data(json!({"name": 7})), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        trace.latest("start").unwrap().error.as_ref().unwrap().kind,
        "invalid_input_type"
    );
}

#[tokio::test]
async fn test_end_requires_declared_outputs() {
    let incomplete = flow(json!({
        "code": "incomplete",
        "name": "Incomplete",
        "entry": "end",
        "output_schema": [{"name": "answer", "type": "integer", "required": true}],
        "nodes": [{"node_id": "end", "type": "end"}]
    }));
    let trace = runtime_with_flows()
        .await
        .execute(&incomplete, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        trace.latest("end").unwrap().error.as_ref().unwrap().kind,
        "missing_input"
    );
}

#[tokio::test]
async fn test_end_with_next_nodes_is_invalid() {
    let bad = flow(json!({
        "code": "bad",
        "name": "Bad",
        "entry": "end",
        "nodes": [
            {"node_id": "end", "type": "end", "next_nodes": ["other"]},
            {"node_id": "other", "type": "log", "params": {"message": {"kind": "constant", "value": "x"}}}
        ]
    }));
    let err = runtime_with_flows()
        .await
        .execute(&bad, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_child_trigger_names_the_parent() {
    let loader = Arc::new(InMemoryFlowLoader::new());
    loader
        .insert(flow(json!({
            "code": "whoami",
            "name": "Who am I",
            "entry": "end",
            "output_schema": [{"name": "kind", "type": "string"}],
            "nodes": [{"node_id": "end", "type": "end", "params": {"outputs": {
                "kind": reference("sys.trigger.type")
            }}}]
        })))
        .await;
    let parent = single_node(json!({
        "node_id": "node", "type": "sub_flow", "params": {"flow": "whoami"}
    }));

    let runtime = FlowRuntime::new(flownodes::default_registry()).with_loader(loader);
    let trace = runtime
        .execute(&parent, &mut data(json!({})), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        trace.latest("node").unwrap().output,
        Some(Value::from(json!({"kind": "sub_flow"})))
    );
}

#[tokio::test]
async fn test_cancelling_a_delay_cancels_the_run() {
    let slow = flow(json!({
        "code": "slow",
        "name": "Slow",
        "entry": "wait",
        "nodes": [
            {"node_id": "wait", "type": "delay", "params": {"delay_ms": 60000}, "next_nodes": ["after"]},
            {"node_id": "after", "type": "log", "params": {"message": {"kind": "constant", "value": "late"}}}
        ]
    }));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = runtime_with_flows()
        .await
        .execute(&slow, &mut data(json!({})), token)
        .await;
    assert!(matches!(result, Err(FlowError::Cancelled)));
}
