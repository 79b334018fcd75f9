//! Workflow nodes and their type-tagged payloads.

use serde::{Deserialize, Serialize};

use super::action::ActionData;
use super::trigger::TriggerData;
use crate::condition::ComparisonOperator;
use crate::id::ControllerId;
use crate::sensor::SensorType;

/// Node identifier, unique within one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Editor canvas position. Ignored by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Payload of a condition node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionData {
    pub sensor_type: SensorType,
    pub operator: ComparisonOperator,
    pub threshold: f64,
    #[serde(default)]
    pub unit: Option<String>,
    /// Read this controller's sensor; falls back to the triggering
    /// controller, then to the freshest reading of the type.
    #[serde(default)]
    pub controller_id: Option<ControllerId>,
}

impl std::fmt::Display for ConditionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.sensor_type, self.operator, self.threshold)?;
        if let Some(unit) = &self.unit {
            write!(f, "{unit}")?;
        }
        Ok(())
    }
}

/// Payload of a delay node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayData {
    pub duration_secs: u64,
}

/// Type-tagged node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeData {
    Trigger(TriggerData),
    Condition(ConditionData),
    Action(ActionData),
    Delay(DelayData),
}

/// Discriminant of [`NodeData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Trigger,
    Condition,
    Action,
    Delay,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Trigger => "trigger",
            Self::Condition => "condition",
            Self::Action => "action",
            Self::Delay => "delay",
        })
    }
}

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    #[serde(default)]
    pub position: Position,
    pub data: NodeData,
}

impl WorkflowNode {
    /// Create a node at the canvas origin.
    #[must_use]
    pub fn new(id: impl Into<String>, data: NodeData) -> Self {
        Self {
            id: NodeId::new(id),
            position: Position::default(),
            data,
        }
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Trigger(_) => NodeKind::Trigger,
            NodeData::Condition(_) => NodeKind::Condition,
            NodeData::Action(_) => NodeKind::Action,
            NodeData::Delay(_) => NodeKind::Delay,
        }
    }

    /// Trigger payload, when this is a trigger node.
    #[must_use]
    pub fn as_trigger(&self) -> Option<&TriggerData> {
        match &self.data {
            NodeData::Trigger(trigger) => Some(trigger),
            _ => None,
        }
    }
}
