//! Notification sink port: structured events for an external alerting
//! subsystem.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use roomhub_domain::error::RoomHubError;
use roomhub_domain::execution::{ActionReport, ExecutionOutcome};
use roomhub_domain::id::{ControllerId, DimmerConfigId};

/// Events the engine emits outward.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An execution reached a terminal status.
    ExecutionFinished(ExecutionOutcome),
    /// One action-executor invocation finished.
    ActionReported(ActionReport),
    /// A dimmer config failed `consecutive_failures` ticks in a row.
    DimmerFailureAlert {
        config_id: DimmerConfigId,
        controller_id: ControllerId,
        port: u8,
        consecutive_failures: u32,
        last_error: Option<String>,
    },
    /// A previously alerted dimmer config commanded successfully again.
    DimmerRecovered {
        config_id: DimmerConfigId,
        controller_id: ControllerId,
        port: u8,
        failed_ticks: u32,
    },
}

impl Notification {
    /// Short name, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutionFinished(_) => "execution_finished",
            Self::ActionReported(_) => "action_reported",
            Self::DimmerFailureAlert { .. } => "dimmer_failure_alert",
            Self::DimmerRecovered { .. } => "dimmer_recovered",
        }
    }
}

/// Receives [`Notification`]s. Delivery is fire-and-forget for the engine:
/// a failing sink is logged and never affects an execution.
pub trait NotificationSink: Send + Sync {
    fn notify(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), RoomHubError>> + Send;
}

impl<T: NotificationSink> NotificationSink for Arc<T> {
    fn notify(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), RoomHubError>> + Send {
        (**self).notify(notification)
    }
}
