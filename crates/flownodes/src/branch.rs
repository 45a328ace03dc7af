use async_trait::async_trait;
use flowcore::{DebugEntry, NodeError, NodeId, NodeSpec, Value, VertexResult};
use flowexpr::{Component, ComponentEvaluator, EvalError};
use flowruntime::{parse_params, NodeContext, NodeRunner, RunnerMetadata};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Only the first matching branch is taken.
    #[default]
    First,
    /// Every matching branch is taken.
    Any,
}

#[derive(Debug, Clone, Deserialize)]
struct Branch {
    id: String,
    #[serde(default, rename = "else")]
    is_else: bool,
    #[serde(default)]
    condition: Option<Component>,
    #[serde(default)]
    next_nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Deserialize)]
struct IfParams {
    branches: Vec<Branch>,
    #[serde(default)]
    match_mode: MatchMode,
}

/// Conditional branching over authored branches.
///
/// Every non-else branch is evaluated and logged even after a match, so the
/// debug log always holds one entry per condition.
pub struct IfRunner {
    version: &'static str,
    allow_any: bool,
}

impl IfRunner {
    /// First-match only.
    pub fn v0() -> Self {
        Self {
            version: "v0",
            allow_any: false,
        }
    }

    /// Adds `match_mode: any`.
    pub fn v1() -> Self {
        Self {
            version: "v1",
            allow_any: true,
        }
    }

    fn params(&self, node: &NodeSpec) -> Result<IfParams, NodeError> {
        let params: IfParams = parse_params(node)?;

        if params.match_mode == MatchMode::Any && !self.allow_any {
            return Err(NodeError::Configuration(format!(
                "match_mode 'any' is not supported by if {}",
                self.version
            )));
        }
        if params.branches.iter().filter(|b| b.is_else).count() > 1 {
            return Err(NodeError::Configuration(
                "at most one else branch is allowed".to_string(),
            ));
        }
        for branch in &params.branches {
            if !branch.is_else && branch.condition.is_none() {
                return Err(NodeError::Configuration(format!(
                    "branch '{}' has no condition",
                    branch.id
                )));
            }
        }
        Ok(params)
    }
}

#[async_trait]
impl NodeRunner for IfRunner {
    fn node_type(&self) -> &str {
        "if"
    }

    fn version(&self) -> &str {
        self.version
    }

    fn metadata(&self) -> RunnerMetadata {
        RunnerMetadata::new("control", "Route to the branch whose condition holds")
    }

    fn validate(&self, node: &NodeSpec, evaluator: &ComponentEvaluator) -> Result<(), NodeError> {
        let params = self.params(node)?;
        for condition in params.branches.iter().filter_map(|b| b.condition.as_ref()) {
            evaluator.prepare(condition)?;
        }
        Ok(())
    }

    fn edges(&self, node: &NodeSpec) -> Result<Vec<NodeId>, NodeError> {
        let params = self.params(node)?;
        let mut edges: Vec<NodeId> = Vec::new();
        for target in params.branches.into_iter().flat_map(|b| b.next_nodes) {
            if !edges.contains(&target) {
                edges.push(target);
            }
        }
        Ok(edges)
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<VertexResult, NodeError> {
        let params = self.params(ctx.node)?;

        let mut debug_log = Vec::with_capacity(params.branches.len());
        let mut matched: Vec<&Branch> = Vec::new();

        for branch in params.branches.iter().filter(|b| !b.is_else) {
            let Some(condition) = &branch.condition else {
                continue;
            };
            let inputs = ctx.evaluator().snapshot_inputs(condition, ctx.data);

            let (value, error) = match ctx.evaluate(condition) {
                Ok(value) => (value, None),
                // an unparsable condition is a broken flow, not a false branch
                Err(EvalError::Invalid(message)) => {
                    return Err(NodeError::Configuration(format!(
                        "branch '{}': {}",
                        branch.id, message
                    )))
                }
                Err(err) => {
                    tracing::debug!(branch = %branch.id, "Branch condition failed: {}", err);
                    (Value::Null, Some(err.to_string()))
                }
            };

            let hit = error.is_none() && value.is_truthy();
            let selected = hit && (params.match_mode == MatchMode::Any || matched.is_empty());
            if selected {
                matched.push(branch);
            }

            debug_log.push(DebugEntry::Branch {
                branch_id: branch.id.clone(),
                hit,
                selected,
                value,
                inputs,
                error,
            });
        }

        let else_branch = params.branches.iter().find(|b| b.is_else);
        let used_else = matched.is_empty() && else_branch.is_some();

        let children: Vec<NodeId> = if matched.is_empty() {
            else_branch.map(|b| b.next_nodes.clone()).unwrap_or_default()
        } else {
            matched.iter().flat_map(|b| b.next_nodes.iter().cloned()).collect()
        };

        let mut hits: Vec<Value> = matched.iter().map(|b| Value::from(b.id.as_str())).collect();
        if used_else {
            if let Some(branch) = else_branch {
                hits.push(Value::from(branch.id.as_str()));
            }
        }
        let output = Value::object([
            ("hit", Value::Bool(!matched.is_empty())),
            ("branches", Value::Array(hits)),
            ("else", Value::Bool(used_else)),
        ]);

        Ok(VertexResult::success(children)
            .with_output(output)
            .with_debug_log(debug_log)
            .dedup_children())
    }
}
