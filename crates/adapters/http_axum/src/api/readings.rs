//! Sensor reading ingestion and the cached reading listing.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use roomhub_app::ports::{AutomationRepository, NotificationSink};
use roomhub_app::sensor_cache::CachedReading;
use roomhub_domain::id::ControllerId;
use roomhub_domain::sensor::{SensorReading, SensorType};
use roomhub_domain::time::{Timestamp, now};

use crate::error::ApiError;
use crate::state::AppState;

/// How far ahead of the server clock a pushed timestamp may be.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// One pushed reading; `timestamp` defaults to the time of receipt.
#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    pub controller_id: ControllerId,
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub value: f64,
    pub unit: Option<String>,
    pub timestamp: Option<Timestamp>,
}

impl ReadingRequest {
    fn into_reading(self, received_at: Timestamp) -> SensorReading {
        SensorReading {
            controller_id: self.controller_id,
            sensor_id: self.sensor_id,
            sensor_type: self.sensor_type,
            value: self.value,
            unit: self.unit,
            timestamp: self.timestamp.unwrap_or(received_at),
        }
    }
}

/// A single reading or a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IngestRequest {
    Batch(Vec<ReadingRequest>),
    One(ReadingRequest),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub controller_id: Option<ControllerId>,
}

/// `POST /api/readings`: queue readings for the dispatcher.
pub async fn ingest<R, N>(
    State(state): State<AppState<R, N>>,
    Json(body): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError>
where
    R: AutomationRepository + 'static,
    N: NotificationSink + 'static,
{
    let received_at = now();
    let requests = match body {
        IngestRequest::Batch(requests) => requests,
        IngestRequest::One(request) => vec![request],
    };
    if let Some(bad) = requests.iter().find(|r| !r.value.is_finite()) {
        return Err(ApiError::BadRequest(format!(
            "non-finite value for sensor `{}`",
            bad.sensor_id
        )));
    }
    let latest_allowed = received_at + chrono::Duration::seconds(MAX_CLOCK_SKEW_SECS);
    if let Some(bad) = requests
        .iter()
        .find(|r| r.timestamp.is_some_and(|at| at > latest_allowed))
    {
        return Err(ApiError::BadRequest(format!(
            "timestamp of sensor `{}` is in the future",
            bad.sensor_id
        )));
    }

    let accepted = requests.len();
    for request in requests {
        state
            .readings
            .send(request.into_reading(received_at))
            .await
            .map_err(|_| ApiError::Unavailable("ingestion feed closed"))?;
    }
    Ok((StatusCode::ACCEPTED, Json(IngestResponse { accepted })))
}

/// `GET /api/readings`: cached readings, optionally for one controller.
pub async fn list<R, N>(
    State(state): State<AppState<R, N>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<CachedReading>>
where
    R: AutomationRepository + 'static,
    N: NotificationSink + 'static,
{
    let readings = state
        .cache
        .snapshot(now())
        .into_iter()
        .filter(|cached| {
            query
                .controller_id
                .is_none_or(|id| cached.reading.controller_id == id)
        })
        .collect();
    Json(readings)
}
