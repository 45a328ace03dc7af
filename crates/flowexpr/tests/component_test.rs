use flowcore::{ExecutionData, Operator, Trigger, Value};
use flowexpr::{CompareOp, Component, ComponentEvaluator, EvalError, Sandbox};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn evaluator() -> ComponentEvaluator {
    ComponentEvaluator::new(Arc::new(Sandbox::default()))
}

fn data(inputs: serde_json::Value) -> ExecutionData {
    let inputs: HashMap<String, Value> = match Value::from(inputs) {
        Value::Object(map) => map,
        _ => HashMap::new(),
    };
    ExecutionData::new(Trigger::manual(), Operator::user("tester"), inputs)
}

#[test]
fn test_component_deserializes_from_params() {
    let component: Component = serde_json::from_value(json!({
        "kind": "all",
        "operands": [
            {"kind": "compare", "op": "gt",
             "left": {"kind": "reference", "path": "input.score"},
             "right": {"kind": "constant", "value": 60}},
            {"kind": "compare", "op": "not_empty",
             "left": {"kind": "reference", "path": "input.name"}}
        ]
    }))
    .unwrap();

    let result = evaluator()
        .evaluate_condition(&component, &data(json!({"score": 75, "name": "Alice"})))
        .unwrap();
    assert!(result);
}

#[test]
fn test_reference_to_missing_path_is_null() {
    let value = evaluator()
        .evaluate(&Component::reference("input.nope.deeper"), &data(json!({})))
        .unwrap();
    assert_eq!(value, Value::Null);
}

#[test]
fn test_expression_sees_all_roots() {
    let mut data = data(json!({"score": 10}));
    data.set_variable("bonus", Value::Integer(5));
    data.set_node_output("calc", Value::from(json!({"factor": 3})));

    let value = evaluator()
        .evaluate(
            &Component::expression("(input.score + var.bonus) * nodes.calc.factor"),
            &data,
        )
        .unwrap();
    assert_eq!(value, Value::Integer(45));

    let operator = evaluator()
        .evaluate(&Component::expression("sys.operator.id"), &data)
        .unwrap();
    assert_eq!(operator, Value::from("tester"));
}

#[test]
fn test_template_interpolation() {
    let value = evaluator()
        .evaluate(
            &Component::template("Hello {{ input.name }}, you have {{input.count}} items{{input.none}}"),
            &data(json!({"name": "Bob", "count": 3})),
        )
        .unwrap();
    assert_eq!(value, Value::from("Hello Bob, you have 3 items"));
}

#[test]
fn test_composite_object_and_list() {
    let component: Component = serde_json::from_value(json!({
        "kind": "object",
        "fields": {
            "name": {"kind": "reference", "path": "input.name"},
            "flags": {"kind": "list", "items": [
                {"kind": "constant", "value": true},
                {"kind": "not", "operand": {"kind": "constant", "value": true}}
            ]}
        }
    }))
    .unwrap();

    let value = evaluator().evaluate(&component, &data(json!({"name": "Ann"}))).unwrap();
    assert_eq!(value, Value::from(json!({"name": "Ann", "flags": [true, false]})));
}

#[test]
fn test_unparsable_script_is_invalid_component() {
    let component = Component::expression("input.score >");
    assert!(matches!(evaluator().prepare(&component), Err(EvalError::Invalid(_))));
    assert!(matches!(
        evaluator().evaluate(&component, &data(json!({}))),
        Err(EvalError::Invalid(_))
    ));
}

#[test]
fn test_throwing_script_is_evaluation_failure() {
    let result = evaluator().evaluate(&Component::expression("throw \"no\""), &data(json!({})));
    assert!(matches!(result, Err(EvalError::Failed(_))));
}

#[test]
fn test_binary_compare_without_right_operand_is_invalid() {
    let component = Component::Compare {
        op: CompareOp::Eq,
        left: Box::new(Component::constant(1i64)),
        right: None,
    };
    assert!(matches!(
        evaluator().evaluate(&component, &data(json!({}))),
        Err(EvalError::Invalid(_))
    ));
}

#[test]
fn test_prepare_rejects_nested_compare_without_right_operand() {
    let component: Component = serde_json::from_value(json!({
        "kind": "all",
        "operands": [
            {"kind": "constant", "value": true},
            {"kind": "not", "operand": {"kind": "compare", "op": "gt",
                "left": {"kind": "reference", "path": "input.score"}}}
        ]
    }))
    .unwrap();
    assert!(matches!(evaluator().prepare(&component), Err(EvalError::Invalid(_))));

    let unary = Component::unary(CompareOp::IsNull, Component::reference("input.score"));
    assert!(evaluator().prepare(&unary).is_ok());
    assert!(matches!(
        evaluator().prepare(&Component::reference("  ")),
        Err(EvalError::Invalid(_))
    ));
}

#[test]
fn test_evaluation_does_not_touch_execution_data() {
    let data = data(json!({"v": 1}));
    let before = data.bindings();
    let _ = evaluator().evaluate(&Component::expression("input.v = 5; input.v"), &data);
    assert_eq!(data.bindings(), before);
}

#[test]
fn test_snapshot_inputs_lists_referenced_paths() {
    let component = Component::compare(
        CompareOp::Gt,
        Component::expression("input.score + var.extra"),
        Component::reference("input.threshold"),
    );
    let mut data = data(json!({"score": 1, "threshold": 2}));
    data.set_variable("extra", Value::Integer(7));

    let snapshot = evaluator().snapshot_inputs(&component, &data);
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot["input.threshold"], Value::Integer(2));
    assert_eq!(snapshot["var.extra"], Value::Integer(7));
}
