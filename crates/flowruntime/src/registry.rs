use crate::runner::{NodeRunner, RunnerMetadata};
use flowcore::version::{compare_versions, is_latest};
use flowcore::{NodeSpec, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
struct RegisteredRunner {
    version: String,
    runner: Arc<dyn NodeRunner>,
}

/// Summary of one registered `(type, version)` pair.
#[derive(Debug, Clone)]
pub struct RunnerInfo {
    pub node_type: String,
    pub version: String,
    pub metadata: RunnerMetadata,
}

/// Lookup table from `(node type, version)` to runner.
///
/// Populated once at startup, then shared read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct NodeRunnerRegistry {
    runners: HashMap<String, Vec<RegisteredRunner>>,
}

impl NodeRunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner under its declared type and version.
    pub fn register(&mut self, runner: Arc<dyn NodeRunner>) {
        let node_type = runner.node_type().to_string();
        let version = runner.version().to_string();
        self.register_as(node_type, version, runner);
    }

    /// Register a runner under an explicit `(type, version)`.
    pub fn register_as(
        &mut self,
        node_type: impl Into<String>,
        version: impl Into<String>,
        runner: Arc<dyn NodeRunner>,
    ) {
        let node_type = node_type.into();
        let version = version.into();
        tracing::debug!("Registering node runner: {} ({})", node_type, version);

        let versions = self.runners.entry(node_type.clone()).or_default();
        if let Some(existing) = versions.iter_mut().find(|r| r.version == version) {
            tracing::warn!("Replacing node runner {} ({})", node_type, version);
            existing.runner = runner;
            return;
        }
        versions.push(RegisteredRunner { version, runner });
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
    }

    /// Resolve a runner. An exact version match wins; empty or `latest`
    /// picks the highest registered version.
    pub fn resolve(
        &self,
        node_type: &str,
        version: &str,
    ) -> Result<(&str, Arc<dyn NodeRunner>), WorkflowError> {
        let not_found = || WorkflowError::UnknownNodeType {
            node_type: node_type.to_string(),
            version: version.to_string(),
        };

        let versions = self.runners.get(node_type).ok_or_else(not_found)?;
        let found = if is_latest(version) {
            versions.last()
        } else {
            versions.iter().find(|r| r.version == version.trim())
        };

        found
            .map(|r| (r.version.as_str(), r.runner.clone()))
            .ok_or_else(not_found)
    }

    pub fn resolve_node(&self, node: &NodeSpec) -> Result<(&str, Arc<dyn NodeRunner>), WorkflowError> {
        self.resolve(&node.node_type, &node.version)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.runners.contains_key(node_type)
    }

    /// Every registered pair, sorted by type then version.
    pub fn list(&self) -> Vec<RunnerInfo> {
        let mut types: Vec<&String> = self.runners.keys().collect();
        types.sort();

        types
            .into_iter()
            .flat_map(|node_type| {
                self.runners[node_type].iter().map(move |r| RunnerInfo {
                    node_type: node_type.clone(),
                    version: r.version.clone(),
                    metadata: r.runner.metadata(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.runners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}
