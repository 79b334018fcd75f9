//! `SQLite` implementation of [`AutomationRepository`], plus the authoring
//! writes used to seed and maintain the stored rows.

use sqlx::SqlitePool;

use roomhub_app::ports::AutomationRepository;
use roomhub_domain::device::ControllerState;
use roomhub_domain::dimmer::DimmerConfig;
use roomhub_domain::error::RoomHubError;
use roomhub_domain::execution::ExecutionOutcome;
use roomhub_domain::id::{ControllerId, WorkflowId};
use roomhub_domain::time::now;
use roomhub_domain::workflow::Workflow;

use crate::{controllers, dimmers, outcomes, workflows};

/// `SQLite`-backed repository.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a workflow.
    ///
    /// # Errors
    ///
    /// Returns [`RoomHubError::Storage`] on database or encoding failure.
    pub async fn upsert_workflow(&self, workflow: &Workflow) -> Result<(), RoomHubError> {
        Ok(workflows::upsert(&self.pool, workflow).await?)
    }

    /// # Errors
    ///
    /// Returns [`RoomHubError::Storage`] on database or decoding failure.
    pub async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, RoomHubError> {
        Ok(workflows::get(&self.pool, id).await?)
    }

    /// Activate or deactivate a workflow.
    ///
    /// # Errors
    ///
    /// Returns [`RoomHubError::NotFound`] if the workflow does not exist.
    pub async fn set_workflow_active(&self, id: WorkflowId, active: bool) -> Result<(), RoomHubError> {
        if workflows::set_active(&self.pool, id, active, now()).await? {
            Ok(())
        } else {
            Err(roomhub_domain::error::NotFoundError {
                entity: "Workflow",
                id: id.to_string(),
            }
            .into())
        }
    }

    /// Insert or replace a dimmer config.
    ///
    /// # Errors
    ///
    /// Returns [`RoomHubError::Storage`] on database failure.
    pub async fn upsert_dimmer_config(&self, config: &DimmerConfig) -> Result<(), RoomHubError> {
        Ok(dimmers::upsert(&self.pool, config).await?)
    }

    /// Insert or replace a controller and its ports.
    ///
    /// # Errors
    ///
    /// Returns [`RoomHubError::Storage`] on database or encoding failure.
    pub async fn upsert_controller(&self, controller: &ControllerState) -> Result<(), RoomHubError> {
        Ok(controllers::upsert(&self.pool, controller).await?)
    }

    /// # Errors
    ///
    /// Returns [`RoomHubError::Storage`] on database or decoding failure.
    pub async fn list_controllers(&self) -> Result<Vec<ControllerState>, RoomHubError> {
        Ok(controllers::list(&self.pool).await?)
    }

    /// Most recent outcomes of one workflow, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RoomHubError::Storage`] on database or decoding failure.
    pub async fn recent_outcomes(
        &self,
        workflow_id: WorkflowId,
        limit: u32,
    ) -> Result<Vec<ExecutionOutcome>, RoomHubError> {
        Ok(outcomes::recent(&self.pool, workflow_id, limit).await?)
    }
}

impl AutomationRepository for SqliteRepository {
    async fn load_active_workflows(&self) -> Result<Vec<Workflow>, RoomHubError> {
        Ok(workflows::load_active(&self.pool).await?)
    }

    async fn load_active_dimmer_configs(&self) -> Result<Vec<DimmerConfig>, RoomHubError> {
        Ok(dimmers::load_active(&self.pool).await?)
    }

    async fn load_device_state(
        &self,
        controller_id: ControllerId,
    ) -> Result<Option<ControllerState>, RoomHubError> {
        Ok(controllers::get(&self.pool, controller_id).await?)
    }

    async fn record_execution_outcome(&self, outcome: &ExecutionOutcome) -> Result<(), RoomHubError> {
        Ok(outcomes::insert(&self.pool, outcome).await?)
    }
}
