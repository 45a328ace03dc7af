use crate::{NodeId, Value, VertexResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// At least one node recorded a failure; partial completion is a normal outcome.
    PartiallyFailed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallyFailed => "partially_failed",
        }
    }
}

/// One executed vertex in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub seq: usize,
    pub node_id: NodeId,
    pub node_type: String,
    /// Runner version that actually handled the node.
    pub version: String,
    /// Enclosing loop node when the vertex ran inside a loop body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<NodeId>,
    /// Flow nesting depth of the run that produced the entry.
    #[serde(default)]
    pub depth: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub result: VertexResult,
}

/// Ordered record of every vertex result produced by one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrace {
    pub run_id: RunId,
    pub flow_code: String,
    pub flow_version: String,
    pub entries: Vec<TraceEntry>,
    #[serde(default)]
    pub output: Option<Value>,
    pub status: RunStatus,
    #[serde(skip)]
    latest: HashMap<NodeId, usize>,
}

impl RunTrace {
    pub fn new(flow_code: impl Into<String>, flow_version: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            flow_code: flow_code.into(),
            flow_version: flow_version.into(),
            entries: Vec::new(),
            output: None,
            status: RunStatus::Succeeded,
            latest: HashMap::new(),
        }
    }

    /// Append an entry, assigning its sequence number. Returns that number.
    pub fn record(&mut self, mut entry: TraceEntry) -> usize {
        let seq = self.entries.len();
        entry.seq = seq;
        if !entry.result.is_success() {
            self.status = RunStatus::PartiallyFailed;
        }
        self.latest.insert(entry.node_id.clone(), seq);
        self.entries.push(entry);
        seq
    }

    /// Most recent result for a node in this run.
    pub fn latest(&self, node_id: &str) -> Option<&VertexResult> {
        self.latest
            .get(node_id)
            .and_then(|&idx| self.entries.get(idx))
            .map(|entry| &entry.result)
    }

    pub fn visits(&self, node_id: &str) -> usize {
        self.entries.iter().filter(|e| e.node_id == node_id).count()
    }

    /// Node ids in execution order (repeats included).
    pub fn visited(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.node_id.as_str()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(|e| !e.result.is_success())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
