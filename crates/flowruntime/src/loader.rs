use async_trait::async_trait;
use flowcore::version::{compare_versions, is_latest};
use flowcore::{Flow, FlowError, WorkflowError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of flow definitions. The engine treats returned flows as immutable.
#[async_trait]
pub trait FlowLoader: Send + Sync {
    /// `None`, empty or `latest` resolves to the highest stored version.
    async fn load_flow(&self, code: &str, version: Option<&str>) -> Result<Arc<Flow>, FlowError>;
}

fn pick_version(versions: &[Arc<Flow>], code: &str, version: Option<&str>) -> Result<Arc<Flow>, FlowError> {
    let found = match version {
        Some(v) if !is_latest(v) => versions.iter().find(|f| f.version == v.trim()),
        _ => versions
            .iter()
            .max_by(|a, b| compare_versions(&a.version, &b.version)),
    };
    found.cloned().ok_or_else(|| {
        FlowError::Workflow(WorkflowError::NotFound(match version {
            Some(v) => format!("{}@{}", code, v),
            None => code.to_string(),
        }))
    })
}

/// Flows held in memory, keyed by code.
#[derive(Default)]
pub struct InMemoryFlowLoader {
    flows: RwLock<HashMap<String, Vec<Arc<Flow>>>>,
}

impl InMemoryFlowLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a flow, replacing any stored flow with the same code and version.
    pub async fn insert(&self, flow: Flow) {
        let mut flows = self.flows.write().await;
        let versions = flows.entry(flow.code.clone()).or_default();
        versions.retain(|f| f.version != flow.version);
        versions.push(Arc::new(flow));
    }

    pub async fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.flows.read().await.keys().cloned().collect();
        codes.sort();
        codes
    }
}

#[async_trait]
impl FlowLoader for InMemoryFlowLoader {
    async fn load_flow(&self, code: &str, version: Option<&str>) -> Result<Arc<Flow>, FlowError> {
        let flows = self.flows.read().await;
        let versions = flows
            .get(code)
            .ok_or_else(|| FlowError::Workflow(WorkflowError::NotFound(code.to_string())))?;
        pick_version(versions, code, version)
    }
}

/// Reads `*.json` flow files from a directory on every load.
pub struct DirectoryFlowLoader {
    dir: PathBuf,
}

impl DirectoryFlowLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_all(&self) -> Result<DirectoryScan, FlowError> {
        let mut scan = DirectoryScan::default();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Flow>(&raw) {
                Ok(flow) => scan.flows.push(flow),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    scan.broken.push(BrokenFile {
                        code: declared_code(&raw, &path),
                        error: e,
                    });
                }
            }
        }
        Ok(scan)
    }
}

#[derive(Default)]
struct DirectoryScan {
    flows: Vec<Flow>,
    broken: Vec<BrokenFile>,
}

/// A `.json` file that is not a valid flow, with the code it appears to declare.
struct BrokenFile {
    code: String,
    error: serde_json::Error,
}

/// The file's `code` field when it is at least JSON, else the file stem.
fn declared_code(raw: &str, path: &Path) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("code").and_then(|c| c.as_str()).map(str::to_string))
        .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .unwrap_or_default()
}

#[async_trait]
impl FlowLoader for DirectoryFlowLoader {
    async fn load_flow(&self, code: &str, version: Option<&str>) -> Result<Arc<Flow>, FlowError> {
        let scan = self.read_all().await?;
        let versions: Vec<Arc<Flow>> = scan
            .flows
            .into_iter()
            .filter(|f| f.code == code)
            .map(Arc::new)
            .collect();
        if versions.is_empty() {
            // a file meant to hold this flow failed to parse
            if let Some(broken) = scan.broken.into_iter().find(|b| b.code == code) {
                return Err(FlowError::Serialization(broken.error));
            }
            return Err(FlowError::Workflow(WorkflowError::NotFound(code.to_string())));
        }
        pick_version(&versions, code, version)
    }
}
