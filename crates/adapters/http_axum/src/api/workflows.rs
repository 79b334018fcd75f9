//! Loaded workflows and manual trigger invocation.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use roomhub_app::ports::{AutomationRepository, NotificationSink};
use roomhub_domain::execution::ExecutionOutcome;
use roomhub_domain::id::WorkflowId;
use roomhub_domain::time::Timestamp;
use roomhub_domain::workflow::NodeId;

use crate::error::ApiError;
use crate::state::AppState;

/// One loaded workflow and its trigger nodes.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub updated_at: Timestamp,
    pub triggers: Vec<TriggerSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerSummary {
    pub node_id: NodeId,
    pub kind: String,
}

/// Request body for the fire endpoint. Optional; omitting it means
/// fire-and-forget.
#[derive(Debug, Default, Deserialize)]
pub struct FireRequest {
    #[serde(default)]
    pub wait: bool,
}

/// Possible responses from the fire endpoint.
pub enum FireResponse {
    Finished(Json<ExecutionOutcome>),
    Accepted,
}

impl IntoResponse for FireResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Finished(json) => json.into_response(),
            Self::Accepted => (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "status": "accepted" })),
            )
                .into_response(),
        }
    }
}

/// `GET /api/workflows`: workflows the dispatcher is watching.
pub async fn list<R, N>(State(state): State<AppState<R, N>>) -> Json<Vec<WorkflowSummary>>
where
    R: AutomationRepository + 'static,
    N: NotificationSink + 'static,
{
    let mut summaries: Vec<WorkflowSummary> = state
        .dispatcher
        .workflows()
        .iter()
        .map(|workflow| WorkflowSummary {
            id: workflow.id,
            name: workflow.name.clone(),
            updated_at: workflow.updated_at,
            triggers: workflow
                .triggers()
                .map(|(node, trigger)| TriggerSummary {
                    node_id: node.id.clone(),
                    kind: trigger.variant().to_string(),
                })
                .collect(),
        })
        .collect();
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Json(summaries)
}

/// `POST /api/workflows/{id}/triggers/{node_id}/fire`: invoke a manual trigger.
pub async fn fire<R, N>(
    State(state): State<AppState<R, N>>,
    Path((id, node_id)): Path<(String, String)>,
    body: Option<Json<FireRequest>>,
) -> Result<FireResponse, ApiError>
where
    R: AutomationRepository + 'static,
    N: NotificationSink + 'static,
{
    let workflow_id = WorkflowId::from_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("invalid workflow id `{id}`")))?;
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let outcome = state
        .dispatcher
        .fire_manual(workflow_id, NodeId::new(node_id), request.wait)
        .await?;

    Ok(match outcome {
        Some(outcome) => FireResponse::Finished(Json(outcome)),
        None => FireResponse::Accepted,
    })
}
