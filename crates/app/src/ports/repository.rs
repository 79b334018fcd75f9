//! Repository port: the engine's read view of stored rows.

use std::future::Future;
use std::sync::Arc;

use roomhub_domain::device::ControllerState;
use roomhub_domain::dimmer::DimmerConfig;
use roomhub_domain::error::RoomHubError;
use roomhub_domain::execution::ExecutionOutcome;
use roomhub_domain::id::ControllerId;
use roomhub_domain::workflow::Workflow;

/// Read access to workflows, dimmer configs and controllers, plus the one
/// write the engine performs: recording execution outcomes.
pub trait AutomationRepository: Send + Sync {
    /// All workflows whose `is_active` flag is set.
    fn load_active_workflows(
        &self,
    ) -> impl Future<Output = Result<Vec<Workflow>, RoomHubError>> + Send;

    /// All dimmer configs whose `is_active` flag is set.
    fn load_active_dimmer_configs(
        &self,
    ) -> impl Future<Output = Result<Vec<DimmerConfig>, RoomHubError>> + Send;

    /// Brand, credentials and devices of one controller.
    fn load_device_state(
        &self,
        controller_id: ControllerId,
    ) -> impl Future<Output = Result<Option<ControllerState>, RoomHubError>> + Send;

    /// Persist the final record of one execution.
    fn record_execution_outcome(
        &self,
        outcome: &ExecutionOutcome,
    ) -> impl Future<Output = Result<(), RoomHubError>> + Send;
}

impl<T: AutomationRepository> AutomationRepository for Arc<T> {
    fn load_active_workflows(
        &self,
    ) -> impl Future<Output = Result<Vec<Workflow>, RoomHubError>> + Send {
        (**self).load_active_workflows()
    }

    fn load_active_dimmer_configs(
        &self,
    ) -> impl Future<Output = Result<Vec<DimmerConfig>, RoomHubError>> + Send {
        (**self).load_active_dimmer_configs()
    }

    fn load_device_state(
        &self,
        controller_id: ControllerId,
    ) -> impl Future<Output = Result<Option<ControllerState>, RoomHubError>> + Send {
        (**self).load_device_state(controller_id)
    }

    fn record_execution_outcome(
        &self,
        outcome: &ExecutionOutcome,
    ) -> impl Future<Output = Result<(), RoomHubError>> + Send {
        (**self).record_execution_outcome(outcome)
    }
}
