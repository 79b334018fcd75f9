//! Workflow: a stored automation graph of trigger, condition, action and
//! delay nodes joined by directed edges.
//!
//! The engine treats workflows as read-only except for checking
//! [`Workflow::is_active`] before acting. Graph structure is checked by
//! [`Workflow::validate`] and, per execution, by [`WorkflowGraph`].

mod action;
mod edge;
mod graph;
mod node;
mod trigger;

pub use action::{ActionData, ActionKind};
pub use edge::{Branch, WorkflowEdge};
pub use graph::WorkflowGraph;
pub use node::{ConditionData, DelayData, NodeData, NodeId, NodeKind, Position, WorkflowNode};
pub use trigger::TriggerData;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cron::Schedule;
use crate::error::{RoomHubError, ValidationError};
use crate::id::{UserId, WorkflowId};
use crate::time::Timestamp;

/// Longest timer interval or delay accepted, one year.
pub const MAX_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

/// A stored automation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub owner_id: UserId,
    pub name: String,
    /// Storage order only; execution order comes from the edges.
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Workflow {
    /// Create a builder for constructing a [`Workflow`].
    #[must_use]
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::default()
    }

    /// Find a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// All trigger nodes with their payloads.
    pub fn triggers(&self) -> impl Iterator<Item = (&WorkflowNode, &TriggerData)> {
        self.nodes
            .iter()
            .filter_map(|n| n.as_trigger().map(|t| (n, t)))
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RoomHubError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - two nodes share an id ([`ValidationError::DuplicateNodeId`])
    /// - a timer trigger has a zero interval ([`ValidationError::ZeroInterval`])
    /// - a schedule trigger has a bad cron expression or timezone
    /// - an action level exceeds 100 ([`ValidationError::LevelOutOfRange`])
    ///
    /// Returns [`RoomHubError::Graph`] when an edge dangles or carries a
    /// branch tag outside a condition node.
    pub fn validate(&self) -> Result<(), RoomHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(&node.id) {
                return Err(ValidationError::DuplicateNodeId(node.id.to_string()).into());
            }
            match &node.data {
                NodeData::Trigger(TriggerData::Timer { interval_secs: 0 }) => {
                    return Err(ValidationError::ZeroInterval.into());
                }
                NodeData::Trigger(TriggerData::Timer { interval_secs: secs })
                | NodeData::Delay(DelayData {
                    duration_secs: secs,
                }) if *secs > MAX_INTERVAL_SECS => {
                    return Err(ValidationError::IntervalTooLong(*secs).into());
                }
                NodeData::Trigger(TriggerData::Schedule { cron, timezone }) => {
                    Schedule::parse(cron, timezone.as_deref())?;
                }
                NodeData::Action(ActionData {
                    level: Some(level), ..
                }) if *level > 100 => {
                    return Err(ValidationError::LevelOutOfRange(*level).into());
                }
                _ => {}
            }
        }
        WorkflowGraph::new(self)?;
        Ok(())
    }
}

/// Step-by-step builder for [`Workflow`].
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    id: Option<WorkflowId>,
    owner_id: Option<UserId>,
    name: Option<String>,
    nodes: Vec<WorkflowNode>,
    edges: Vec<WorkflowEdge>,
    is_active: Option<bool>,
    updated_at: Option<Timestamp>,
}

impl WorkflowBuilder {
    #[must_use]
    pub fn id(mut self, id: WorkflowId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn owner_id(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn node(mut self, node: WorkflowNode) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn edge(mut self, edge: WorkflowEdge) -> Self {
        self.edges.push(edge);
        self
    }

    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    #[must_use]
    pub fn updated_at(mut self, ts: Timestamp) -> Self {
        self.updated_at = Some(ts);
        self
    }

    /// Consume the builder, validate, and return a [`Workflow`].
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation found by [`Workflow::validate`].
    pub fn build(self) -> Result<Workflow, RoomHubError> {
        let workflow = self.build_unchecked();
        workflow.validate()?;
        Ok(workflow)
    }

    /// Assemble the workflow without validation.
    ///
    /// Rows authored outside the engine can be malformed; the executor
    /// re-checks graph structure at execution start.
    #[must_use]
    pub fn build_unchecked(self) -> Workflow {
        let now = crate::time::now();
        Workflow {
            id: self.id.unwrap_or_default(),
            owner_id: self.owner_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            nodes: self.nodes,
            edges: self.edges,
            is_active: self.is_active.unwrap_or(true),
            created_at: now,
            updated_at: self.updated_at.unwrap_or(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    fn manual_trigger(id: &str) -> WorkflowNode {
        WorkflowNode::new(id, NodeData::Trigger(TriggerData::Manual))
    }

    fn fan_action(id: &str, level: u8) -> WorkflowNode {
        WorkflowNode::new(
            id,
            NodeData::Action(ActionData {
                action: ActionKind::SetFan,
                controller_id: None,
                device_type: None,
                port: None,
                level: Some(level),
            }),
        )
    }

    #[test]
    fn should_build_valid_workflow_when_required_fields_provided() {
        let wf = Workflow::builder()
            .name("Exhaust on demand")
            .node(manual_trigger("t1"))
            .node(fan_action("a1", 80))
            .edge(WorkflowEdge::new("e1", "t1", "a1"))
            .build()
            .unwrap();
        assert!(wf.is_active);
        assert_eq!(wf.triggers().count(), 1);
        assert!(wf.node(&NodeId::from("a1")).is_some());
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = Workflow::builder().node(manual_trigger("t1")).build();
        assert!(matches!(
            result,
            Err(RoomHubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_reject_duplicate_node_ids() {
        let result = Workflow::builder()
            .name("dupes")
            .node(manual_trigger("n1"))
            .node(fan_action("n1", 10))
            .build();
        assert!(matches!(
            result,
            Err(RoomHubError::Validation(ValidationError::DuplicateNodeId(_)))
        ));
    }

    #[test]
    fn should_reject_dangling_edge() {
        let result = Workflow::builder()
            .name("dangling")
            .node(manual_trigger("t1"))
            .edge(WorkflowEdge::new("e1", "t1", "missing"))
            .build();
        assert!(matches!(
            result,
            Err(RoomHubError::Graph(GraphError::DanglingEdge { .. }))
        ));
    }

    #[test]
    fn should_reject_level_above_hundred() {
        let result = Workflow::builder()
            .name("too bright")
            .node(fan_action("a1", 120))
            .build();
        assert!(matches!(
            result,
            Err(RoomHubError::Validation(ValidationError::LevelOutOfRange(120)))
        ));
    }

    #[test]
    fn should_reject_zero_timer_interval() {
        let result = Workflow::builder()
            .name("busy loop")
            .node(WorkflowNode::new(
                "t1",
                NodeData::Trigger(TriggerData::Timer { interval_secs: 0 }),
            ))
            .build();
        assert!(matches!(
            result,
            Err(RoomHubError::Validation(ValidationError::ZeroInterval))
        ));
    }

    #[test]
    fn should_reject_timer_interval_beyond_a_year() {
        let result = Workflow::builder()
            .name("never")
            .node(WorkflowNode::new(
                "t1",
                NodeData::Trigger(TriggerData::Timer {
                    interval_secs: u64::MAX,
                }),
            ))
            .build();
        assert!(matches!(
            result,
            Err(RoomHubError::Validation(ValidationError::IntervalTooLong(u64::MAX)))
        ));
    }

    #[test]
    fn should_reject_schedule_with_unknown_timezone() {
        let result = Workflow::builder()
            .name("nightly")
            .node(WorkflowNode::new(
                "t1",
                NodeData::Trigger(TriggerData::Schedule {
                    cron: "0 22 * * *".to_string(),
                    timezone: Some("Nowhere/Land".to_string()),
                }),
            ))
            .build();
        assert!(matches!(
            result,
            Err(RoomHubError::Validation(ValidationError::UnknownTimezone(_)))
        ));
    }

    #[test]
    fn should_roundtrip_workflow_through_serde_json() {
        let wf = Workflow::builder()
            .name("roundtrip")
            .node(manual_trigger("t1"))
            .node(fan_action("a1", 40))
            .edge(WorkflowEdge::new("e1", "t1", "a1"))
            .build()
            .unwrap();
        let json = serde_json::to_string(&wf).unwrap();
        let parsed: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, wf);
    }
}
