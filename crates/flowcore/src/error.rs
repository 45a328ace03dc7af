use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// True when the error describes a malformed or unsupported flow rather
    /// than something that went wrong while running it.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FlowError::Workflow(_) | FlowError::Node(NodeError::Configuration(_))
        )
    }
}

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Adapter call failed: {0}")]
    Adapter(String),

    #[error("Sandbox initialization failed: {0}")]
    SandboxInit(String),

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    /// Fatal errors abort the whole run instead of being recorded on the node.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::Configuration(_) | NodeError::SandboxInit(_) | NodeError::Cancelled
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::MissingInput(_) => "missing_input",
            NodeError::InvalidInputType { .. } => "invalid_input_type",
            NodeError::Configuration(_) => "configuration",
            NodeError::Evaluation(_) => "evaluation",
            NodeError::ExecutionFailed(_) => "execution_failed",
            NodeError::Adapter(_) => "adapter",
            NodeError::SandboxInit(_) => "sandbox_init",
            NodeError::Timeout { .. } => "timeout",
            NodeError::Cancelled => "cancelled",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node '{from}' references unknown node '{to}'")]
    DanglingReference { from: String, to: String },

    #[error("Node '{from}' connects to '{to}' outside of its scope")]
    ScopeViolation { from: String, to: String },

    #[error("No runner registered for node type '{node_type}' (version '{version}')")]
    UnknownNodeType { node_type: String, version: String },

    #[error("Invalid node '{node_id}': {reason}")]
    InvalidNode { node_id: String, reason: String },
}

/// Serializable error payload attached to a failed vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub kind: String,
    pub message: String,
}

impl From<&NodeError> for NodeFailure {
    fn from(err: &NodeError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
