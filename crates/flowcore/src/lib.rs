//! Core abstractions for the flow engine
//!
//! This crate holds the data model every other component shares: flow
//! definitions, the per-run execution context, vertex results and the run
//! trace. It has no knowledge of how nodes are actually run.

mod error;
pub mod events;
mod execution;
mod node;
mod trace;
mod value;
pub mod version;
mod workflow;

pub use error::{FlowError, NodeError, NodeFailure, WorkflowError};
pub use execution::{
    ExecutionData, Operator, OperatorKind, Trigger, TriggerType, INPUT_ROOT, NODES_ROOT,
    SYSTEM_ROOT, VARIABLE_ROOT,
};
pub use node::{DebugEntry, VertexResult, VertexStatus};
pub use trace::{RunId, RunStatus, RunTrace, TraceEntry};
pub use value::Value;
pub use workflow::{
    ErrorHandling, FieldSchema, FieldType, Flow, FlowSettings, FlowType, NodeId, NodeSpec,
};
pub use events::*;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
