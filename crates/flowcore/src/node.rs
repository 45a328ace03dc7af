use crate::{NodeError, NodeFailure, NodeId, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexStatus {
    Succeeded,
    Failed,
}

/// Outcome of one node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexResult {
    pub status: VertexStatus,
    /// Downstream ids chosen by the runner.
    pub children_ids: Vec<NodeId>,
    /// Value published under `nodes.<node_id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeFailure>,
    #[serde(default)]
    pub debug_log: Vec<DebugEntry>,
}

impl VertexResult {
    pub fn success(children: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            status: VertexStatus::Succeeded,
            children_ids: children.into_iter().collect(),
            output: None,
            error: None,
            debug_log: Vec::new(),
        }
    }

    /// Success with no further children; the path ends here.
    pub fn terminal() -> Self {
        Self::success(Vec::new())
    }

    pub fn failure(error: &NodeError) -> Self {
        Self {
            status: VertexStatus::Failed,
            children_ids: Vec::new(),
            output: None,
            error: Some(NodeFailure::from(error)),
            debug_log: Vec::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<Value>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_debug(mut self, entry: DebugEntry) -> Self {
        self.debug_log.push(entry);
        self
    }

    pub fn with_debug_log(mut self, entries: impl IntoIterator<Item = DebugEntry>) -> Self {
        self.debug_log.extend(entries);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = NodeId>) -> Self {
        self.children_ids = children.into_iter().collect();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == VertexStatus::Succeeded
    }

    /// Drop repeated child ids, keeping the first occurrence.
    pub fn dedup_children(mut self) -> Self {
        let mut seen = HashSet::new();
        self.children_ids.retain(|id| seen.insert(id.clone()));
        self
    }
}

/// Structured debug record kept for inspection and replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebugEntry {
    /// One evaluated branch condition of a branching node. `hit` is the
    /// condition outcome, `selected` whether the branch was taken.
    Branch {
        branch_id: String,
        hit: bool,
        #[serde(default)]
        selected: bool,
        value: Value,
        inputs: HashMap<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Evaluation {
        label: String,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Iteration {
        index: usize,
        #[serde(default)]
        item: Value,
    },
    SubFlow {
        code: String,
        run_id: String,
        status: String,
        nodes: usize,
    },
    Message {
        level: String,
        text: String,
    },
}

impl DebugEntry {
    pub fn message(level: impl Into<String>, text: impl Into<String>) -> Self {
        DebugEntry::Message {
            level: level.into(),
            text: text.into(),
        }
    }

    pub fn evaluation(label: impl Into<String>, outcome: Result<&Value, String>) -> Self {
        match outcome {
            Ok(value) => DebugEntry::Evaluation {
                label: label.into(),
                value: value.clone(),
                error: None,
            },
            Err(error) => DebugEntry::Evaluation {
                label: label.into(),
                value: Value::Null,
                error: Some(error),
            },
        }
    }
}
