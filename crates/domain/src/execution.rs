//! Execution outcomes: what one run of a workflow did.

use serde::{Deserialize, Serialize};

use crate::device::DeviceCommand;
use crate::error::{AdapterError, GraphError};
use crate::id::{ControllerId, ExecutionId, WorkflowId};
use crate::time::Timestamp;
use crate::workflow::NodeId;

/// A trigger firing handed from the dispatcher to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireEvent {
    pub workflow_id: WorkflowId,
    pub trigger_node_id: NodeId,
    pub fired_at: Timestamp,
    /// Controller whose reading fired a sensor trigger.
    #[serde(default)]
    pub origin_controller: Option<ControllerId>,
}

impl FireEvent {
    #[must_use]
    pub fn new(workflow_id: WorkflowId, trigger_node_id: NodeId, fired_at: Timestamp) -> Self {
        Self {
            workflow_id,
            trigger_node_id,
            fired_at,
            origin_controller: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, controller_id: ControllerId) -> Self {
        self.origin_controller = Some(controller_id);
        self
    }
}

/// Lifecycle of one execution: `Pending → Running → {Completed, Failed, Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// Errors recorded on an execution. None of them escape the execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("workflow is already running")]
    AlreadyRunning,

    #[error("action {node_id} failed: {error}")]
    ActionFailed { node_id: NodeId, error: String },

    #[error("delay {node_id} interrupted by shutdown")]
    DelayInterrupted { node_id: NodeId },
}

impl ExecutionError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already_running",
            Self::ActionFailed { .. } => "action_failed",
            Self::DelayInterrupted { .. } => "delay_interrupted",
        }
    }
}

/// Result of one action-executor invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    /// Action node, absent for dimmer scheduler commands.
    pub node_id: Option<NodeId>,
    pub workflow_id: Option<WorkflowId>,
    pub controller_id: Option<ControllerId>,
    pub port: Option<u8>,
    pub command: DeviceCommand,
    pub requested: u8,
    pub actual: Option<u8>,
    pub previous: Option<u8>,
    pub attempts: u32,
    pub success: bool,
    /// [`AdapterError::kind`] or `"unresolved_target"` / `"unknown_brand"`.
    pub error: Option<String>,
}

impl ActionReport {
    /// A report for a command that never reached an adapter.
    #[must_use]
    pub fn unresolved(command: DeviceCommand, reason: &str) -> Self {
        Self {
            node_id: None,
            workflow_id: None,
            controller_id: None,
            port: None,
            requested: command.requested_level(),
            command,
            actual: None,
            previous: None,
            attempts: 0,
            success: false,
            error: Some(reason.to_string()),
        }
    }

    #[must_use]
    pub fn failed_with(mut self, error: &AdapterError) -> Self {
        self.success = false;
        self.error = Some(error.kind().to_string());
        self
    }
}

/// Why an execution did not run or did not finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    AlreadyRunning,
    WorkflowInactive,
    WorkflowNotFound,
    CycleDetected,
    DanglingEdge,
    UnreachableBranch,
    UnknownTrigger,
    Interrupted,
}

impl From<&GraphError> for OutcomeReason {
    fn from(error: &GraphError) -> Self {
        match error {
            GraphError::CycleDetected { .. } => Self::CycleDetected,
            GraphError::DanglingEdge { .. } => Self::DanglingEdge,
            GraphError::UnreachableBranch { .. } => Self::UnreachableBranch,
            GraphError::UnknownTrigger { .. } => Self::UnknownTrigger,
        }
    }
}

/// Final record of one execution, reported to the repository and the
/// notification sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub trigger_node_id: NodeId,
    pub fired_at: Timestamp,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub status: ExecutionStatus,
    pub reason: Option<OutcomeReason>,
    pub errors: Vec<ExecutionError>,
    pub actions: Vec<ActionReport>,
}

impl ExecutionOutcome {
    /// An outcome for a fire that never ran.
    #[must_use]
    pub fn skipped(fire: &FireEvent, reason: OutcomeReason) -> Self {
        let now = crate::time::now();
        let errors = match reason {
            OutcomeReason::AlreadyRunning => vec![ExecutionError::AlreadyRunning],
            _ => Vec::new(),
        };
        Self {
            execution_id: ExecutionId::new(),
            workflow_id: fire.workflow_id,
            trigger_node_id: fire.trigger_node_id.clone(),
            fired_at: fire.fired_at,
            started_at: now,
            finished_at: now,
            status: ExecutionStatus::Skipped,
            reason: Some(reason),
            errors,
            actions: Vec::new(),
        }
    }

    /// Reports of actions that targeted `node_id`.
    pub fn actions_for<'a>(&'a self, node_id: &'a NodeId) -> impl Iterator<Item = &'a ActionReport> {
        self.actions
            .iter()
            .filter(move |report| report.node_id.as_ref() == Some(node_id))
    }
}
