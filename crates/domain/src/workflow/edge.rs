//! Workflow edges.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Branch tag carried by edges leaving a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    True,
    False,
}

impl From<bool> for Branch {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// A directed connection between two nodes of the same workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub branch: Option<Branch>,
}

impl WorkflowEdge {
    /// Plain edge without handles, label or branch.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: NodeId::new(source),
            target: NodeId::new(target),
            source_handle: None,
            target_handle: None,
            label: None,
            branch: None,
        }
    }

    /// Tag this edge with a condition branch.
    #[must_use]
    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branch = Some(branch);
        self
    }
}
