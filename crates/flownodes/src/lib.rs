//! Standard node library
//!
//! Collection of built-in node runners and tools

mod assign;
mod boundary;
mod branch;
mod code;
mod debug;
mod http;
mod llm;
mod loops;
mod subflow;
mod time;
mod tool;
mod transform;

pub use assign::AssignRunner;
pub use boundary::{EndRunner, StartRunner};
pub use branch::{IfRunner, MatchMode};
pub use code::CodeRunner;
pub use debug::LogRunner;
pub use http::HttpRequestRunner;
pub use llm::LlmRunner;
pub use loops::{LoopMode, LoopRunner};
pub use subflow::SubFlowRunner;
pub use time::{CurrentTimeTool, DelayRunner};
pub use tool::{BuiltinTool, BuiltinToolRunner, ToolBox, ToolRunner};
pub use transform::{JsonParseTool, JsonStringifyTool, TextLengthTool};

use flowruntime::NodeRunnerRegistry;
use once_cell::sync::Lazy;
use std::sync::Arc;

static DEFAULT_REGISTRY: Lazy<Arc<NodeRunnerRegistry>> = Lazy::new(|| {
    let mut registry = NodeRunnerRegistry::new();
    register_all(&mut registry);
    Arc::new(registry)
});

/// Register all standard runners with a registry
pub fn register_all(registry: &mut NodeRunnerRegistry) {
    register_with_tools(registry, Arc::new(ToolBox::standard()));
}

/// Register all standard runners, with tool nodes backed by `tools`
pub fn register_with_tools(registry: &mut NodeRunnerRegistry, tools: Arc<ToolBox>) {
    registry.register(Arc::new(StartRunner));
    registry.register(Arc::new(EndRunner));
    registry.register(Arc::new(IfRunner::v0()));
    registry.register(Arc::new(IfRunner::v1()));
    registry.register(Arc::new(LoopRunner));
    registry.register(Arc::new(SubFlowRunner));
    registry.register(Arc::new(ToolRunner::new(tools.clone())));
    registry.register(Arc::new(BuiltinToolRunner::new(tools)));
    registry.register(Arc::new(LlmRunner));
    registry.register(Arc::new(AssignRunner));
    registry.register(Arc::new(CodeRunner));
    registry.register(Arc::new(HttpRequestRunner::new()));
    registry.register(Arc::new(LogRunner));
    registry.register(Arc::new(DelayRunner));
}

/// Process-wide registry with every standard runner, built on first use
pub fn default_registry() -> Arc<NodeRunnerRegistry> {
    DEFAULT_REGISTRY.clone()
}
