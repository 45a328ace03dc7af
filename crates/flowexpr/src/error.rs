use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("Script does not parse: {message}")]
    Parse { script: String, message: String },

    #[error("Script failed: {0}")]
    Runtime(String),

    #[error("Script returned a non-plain value: {0}")]
    Output(String),

    #[error("Binding '{name}' cannot enter the sandbox: {message}")]
    Binding { name: String, message: String },
}

/// Failure while evaluating a component against execution data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The component itself is malformed (unparsable script and the like).
    #[error("Invalid component: {0}")]
    Invalid(String),

    /// The component is well formed but evaluation failed for these inputs.
    #[error("Evaluation error: {0}")]
    Failed(String),
}

impl EvalError {
    pub fn is_invalid(&self) -> bool {
        matches!(self, EvalError::Invalid(_))
    }
}

impl From<SandboxError> for EvalError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Parse { .. } => EvalError::Invalid(err.to_string()),
            other => EvalError::Failed(other.to_string()),
        }
    }
}

impl From<EvalError> for flowcore::NodeError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Invalid(msg) => flowcore::NodeError::Configuration(msg),
            EvalError::Failed(msg) => flowcore::NodeError::Evaluation(msg),
        }
    }
}
