use crate::{NodeError, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type NodeId = String;

/// Complete flow definition. Immutable once handed to a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub code: String,
    pub name: String,
    #[serde(default = "default_flow_version")]
    pub version: String,
    #[serde(rename = "type", default)]
    pub flow_type: FlowType,
    #[serde(default)]
    pub description: Option<String>,
    /// Node the run starts from.
    pub entry: NodeId,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub input_schema: Vec<FieldSchema>,
    #[serde(default)]
    pub output_schema: Vec<FieldSchema>,
    #[serde(default)]
    pub settings: FlowSettings,
}

fn default_flow_version() -> String {
    "v1".to_string()
}

impl Flow {
    pub fn new(code: impl Into<String>, name: impl Into<String>, entry: impl Into<NodeId>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            version: default_flow_version(),
            flow_type: FlowType::Main,
            description: None,
            entry: entry.into(),
            nodes: Vec::new(),
            input_schema: Vec::new(),
            output_schema: Vec::new(),
            settings: FlowSettings::default(),
        }
    }

    pub fn with_type(mut self, flow_type: FlowType) -> Self {
        self.flow_type = flow_type;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_input(mut self, field: FieldSchema) -> Self {
        self.input_schema.push(field);
        self
    }

    pub fn with_output(mut self, field: FieldSchema) -> Self {
        self.output_schema.push(field);
        self
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.node_id.clone();
        self.nodes.push(node);
        id
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.node_id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    #[default]
    Main,
    Tool,
    SubFlow,
}

/// Node specification in a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub node_id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub next_nodes: Vec<NodeId>,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub on_error: Option<ErrorHandling>,
}

impl NodeSpec {
    pub fn new(node_id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            version: String::new(),
            name: None,
            params: serde_json::Value::Null,
            next_nodes: Vec::new(),
            parent_id: None,
            on_error: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_next<I, S>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.next_nodes.extend(next.into_iter().map(Into::into));
        self
    }

    pub fn with_parent(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_on_error(mut self, on_error: ErrorHandling) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Display label for logs.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.node_id)
    }
}

/// Declared input or output field of a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Null always passes; presence is enforced separately via `required`.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self.field_type, value) {
            (_, Value::Null) | (FieldType::Any, _) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Integer(_) | Value::Number(_)) => true,
            (FieldType::Integer, v) => v.as_i64().is_some(),
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    /// Presence and type check for a resolved field value.
    pub fn check(&self, value: &Value) -> Result<(), NodeError> {
        if value.is_null() && self.required {
            return Err(NodeError::MissingInput(self.name.clone()));
        }
        if !self.accepts(value) {
            return Err(NodeError::InvalidInputType {
                field: self.name.clone(),
                expected: self.field_type.as_str().to_string(),
                actual: value.type_name().to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        }
    }
}

/// Global flow settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowSettings {
    #[serde(default)]
    pub on_error: ErrorHandling,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// What happens after a node records a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// The failed node has no children; other queued paths keep running.
    #[default]
    Stop,
    /// Continue along the node's static `next_nodes`.
    Continue,
    /// Treat the failure as fatal to the run.
    Abort,
}
