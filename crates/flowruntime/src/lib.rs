//! Flow execution runtime
//!
//! This crate provides the engine that runs flows: the versioned node runner
//! registry, the shared runner contract, flow validation and the sequential
//! worklist executor.

mod capabilities;
mod executor;
pub mod loader;
mod registry;
mod runner;
mod runtime;
mod validate;

pub use capabilities::{Capabilities, EchoModelAdapter, ModelAdapter, ModelRequest, ModelResponse, ModelUsage};
pub use executor::FlowExecutor;
pub use loader::{DirectoryFlowLoader, FlowLoader, InMemoryFlowLoader};
pub use registry::{NodeRunnerRegistry, RunnerInfo};
pub use runner::{parse_params, run_node, Frame, NodeContext, NodeRunner, RunnerMetadata};
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use validate::{validate_flow, ValidationReport};
