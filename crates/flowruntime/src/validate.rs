use crate::NodeRunnerRegistry;
use flowcore::{Flow, NodeError, NodeId, WorkflowError};
use flowexpr::ComponentEvaluator;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};

/// Non-fatal findings from validating a flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Check a flow before it runs. Everything that would make the run fail as a
/// whole is an error; suspicious but runnable shapes become warnings.
pub fn validate_flow(
    flow: &Flow,
    registry: &NodeRunnerRegistry,
    evaluator: &ComponentEvaluator,
) -> Result<ValidationReport, WorkflowError> {
    let mut report = ValidationReport::default();

    if flow.nodes.is_empty() {
        return Err(WorkflowError::Invalid(format!(
            "flow '{}' has no nodes",
            flow.code
        )));
    }

    let mut seen = HashSet::new();
    for node in &flow.nodes {
        if !seen.insert(node.node_id.as_str()) {
            return Err(WorkflowError::DuplicateNode(node.node_id.clone()));
        }
    }

    let entry = flow
        .find_node(&flow.entry)
        .ok_or_else(|| WorkflowError::NodeNotFound(flow.entry.clone()))?;
    if entry.parent_id.is_some() {
        return Err(WorkflowError::Invalid(format!(
            "entry node '{}' is nested inside '{}'",
            entry.node_id,
            entry.parent_id.as_deref().unwrap_or_default()
        )));
    }

    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &flow.nodes {
        index.insert(node.node_id.as_str(), graph.add_node(node.node_id.as_str()));
    }
    // body edges only count for reachability, not for cycle detection
    let mut body_edges: Vec<(NodeIndex, NodeIndex)> = Vec::new();

    let invalid = |node_id: &NodeId, err: NodeError| WorkflowError::InvalidNode {
        node_id: node_id.clone(),
        reason: err.to_string(),
    };

    for node in &flow.nodes {
        if let Some(parent) = &node.parent_id {
            if flow.find_node(parent).is_none() {
                return Err(WorkflowError::DanglingReference {
                    from: node.node_id.clone(),
                    to: parent.clone(),
                });
            }
        }

        let (_, runner) = registry.resolve_node(node)?;
        runner
            .validate(node, evaluator)
            .map_err(|e| invalid(&node.node_id, e))?;

        for target in runner.edges(node).map_err(|e| invalid(&node.node_id, e))? {
            let to = flow
                .find_node(&target)
                .ok_or_else(|| WorkflowError::DanglingReference {
                    from: node.node_id.clone(),
                    to: target.clone(),
                })?;
            if to.parent_id != node.parent_id {
                return Err(WorkflowError::ScopeViolation {
                    from: node.node_id.clone(),
                    to: target,
                });
            }
            graph.add_edge(index[node.node_id.as_str()], index[to.node_id.as_str()], ());
        }

        for body_entry in runner.body_entries(node).map_err(|e| invalid(&node.node_id, e))? {
            let to = flow
                .find_node(&body_entry)
                .ok_or_else(|| WorkflowError::DanglingReference {
                    from: node.node_id.clone(),
                    to: body_entry.clone(),
                })?;
            if to.parent_id.as_deref() != Some(node.node_id.as_str()) {
                return Err(WorkflowError::ScopeViolation {
                    from: node.node_id.clone(),
                    to: body_entry,
                });
            }
            body_edges.push((index[node.node_id.as_str()], index[to.node_id.as_str()]));
        }
    }

    if is_cyclic_directed(&graph) {
        report.warnings.push(format!(
            "flow '{}' contains a cycle; termination depends on its runners",
            flow.code
        ));
    }

    for (from, to) in body_edges {
        graph.add_edge(from, to, ());
    }
    let mut reachable = HashSet::new();
    let mut dfs = Dfs::new(&graph, index[entry.node_id.as_str()]);
    while let Some(idx) = dfs.next(&graph) {
        reachable.insert(graph[idx]);
    }
    for node in &flow.nodes {
        if !reachable.contains(node.node_id.as_str()) {
            report
                .warnings
                .push(format!("node '{}' is unreachable from entry", node.node_id));
        }
    }

    for warning in &report.warnings {
        tracing::warn!(flow = %flow.code, "{}", warning);
    }

    Ok(report)
}
