use crate::{NodeId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root names understood by component references and sandbox bindings.
pub const INPUT_ROOT: &str = "input";
pub const VARIABLE_ROOT: &str = "var";
pub const NODES_ROOT: &str = "nodes";
pub const SYSTEM_ROOT: &str = "sys";

/// What kind of event started a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Message { channel: String },
    Timer { expression: String },
    Api,
    SubFlow { parent_code: String, parent_node: NodeId },
}

impl TriggerType {
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Message { .. } => "message",
            TriggerType::Timer { .. } => "timer",
            TriggerType::Api => "api",
            TriggerType::SubFlow { .. } => "sub_flow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(flatten)]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl Trigger {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            payload: Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn manual() -> Self {
        Self::new(TriggerType::Manual)
    }

    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = payload.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    #[default]
    User,
    System,
    Flow,
}

/// Who or what is running the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: OperatorKind,
}

impl Operator {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: OperatorKind::User,
        }
    }

    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            name: None,
            kind: OperatorKind::System,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Per-run context threaded through every node call.
///
/// Created by the caller, mutated by runners as they produce outputs and
/// dropped (or inspected) once the run completes.
#[derive(Debug, Clone)]
pub struct ExecutionData {
    trigger: Trigger,
    operator: Operator,
    inputs: HashMap<String, Value>,
    variables: HashMap<String, Value>,
    node_outputs: HashMap<NodeId, Value>,
    output: Option<Value>,
}

impl ExecutionData {
    pub fn new(trigger: Trigger, operator: Operator, inputs: HashMap<String, Value>) -> Self {
        Self {
            trigger,
            operator,
            inputs,
            variables: HashMap::new(),
            node_outputs: HashMap::new(),
            output: None,
        }
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    pub fn set_input(&mut self, name: impl Into<String>, value: Value) {
        self.inputs.insert(name.into(), value);
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn node_output(&self, node_id: &str) -> Option<&Value> {
        self.node_outputs.get(node_id)
    }

    pub fn set_node_output(&mut self, node_id: impl Into<NodeId>, value: Value) {
        self.node_outputs.insert(node_id.into(), value);
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn set_output(&mut self, value: Value) {
        self.output = Some(value);
    }

    /// Resolve a dotted path such as `input.user.name` or `nodes.llm_1.text`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();
        self.lookup_segments(&segments)
    }

    pub fn lookup_segments(&self, segments: &[&str]) -> Option<Value> {
        let (root, rest) = segments.split_first()?;
        match *root {
            INPUT_ROOT => lookup_in_map(&self.inputs, rest),
            VARIABLE_ROOT => lookup_in_map(&self.variables, rest),
            NODES_ROOT => lookup_in_map(&self.node_outputs, rest),
            SYSTEM_ROOT => self.system_record().get_path(rest).cloned(),
            _ => None,
        }
    }

    /// The whole binding record, keyed by root name. Handed to the sandbox.
    pub fn bindings(&self) -> HashMap<String, Value> {
        let mut bindings = HashMap::new();
        bindings.insert(INPUT_ROOT.to_string(), Value::Object(self.inputs.clone()));
        bindings.insert(VARIABLE_ROOT.to_string(), Value::Object(self.variables.clone()));
        bindings.insert(NODES_ROOT.to_string(), Value::Object(self.node_outputs.clone()));
        bindings.insert(SYSTEM_ROOT.to_string(), self.system_record());
        bindings
    }

    fn system_record(&self) -> Value {
        let mut operator = HashMap::new();
        operator.insert("id".to_string(), Value::from(self.operator.id.clone()));
        operator.insert(
            "name".to_string(),
            self.operator.name.clone().map(Value::from).unwrap_or_default(),
        );
        operator.insert(
            "kind".to_string(),
            Value::from(match self.operator.kind {
                OperatorKind::User => "user",
                OperatorKind::System => "system",
                OperatorKind::Flow => "flow",
            }),
        );

        let mut trigger = HashMap::new();
        trigger.insert("type".to_string(), Value::from(self.trigger.trigger_type.kind()));
        trigger.insert("payload".to_string(), self.trigger.payload.clone());
        trigger.insert(
            "received_at".to_string(),
            Value::from(self.trigger.received_at.to_rfc3339()),
        );

        let mut sys = HashMap::new();
        sys.insert("operator".to_string(), Value::Object(operator));
        sys.insert("trigger".to_string(), Value::Object(trigger));
        Value::Object(sys)
    }
}

fn lookup_in_map(map: &HashMap<String, Value>, path: &[&str]) -> Option<Value> {
    match path.split_first() {
        None => Some(Value::Object(map.clone())),
        Some((key, rest)) => map.get(*key)?.get_path(rest).cloned(),
    }
}
