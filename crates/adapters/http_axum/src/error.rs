//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use roomhub_domain::error::{GraphError, RoomHubError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps failures to an HTTP response with appropriate status code.
#[derive(Debug)]
pub enum ApiError {
    Domain(RoomHubError),
    BadRequest(String),
    /// The engine is shutting down and no longer accepts work.
    Unavailable(&'static str),
}

impl From<RoomHubError> for ApiError {
    fn from(err: RoomHubError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message.to_string()),
            Self::Domain(err) => match &err {
                RoomHubError::Validation(inner) => (StatusCode::BAD_REQUEST, inner.to_string()),
                RoomHubError::NotFound(inner) => (StatusCode::NOT_FOUND, inner.to_string()),
                RoomHubError::Graph(inner @ GraphError::UnknownTrigger { .. }) => {
                    (StatusCode::NOT_FOUND, inner.to_string())
                }
                RoomHubError::Graph(inner) => (StatusCode::UNPROCESSABLE_ENTITY, inner.to_string()),
                RoomHubError::Adapter(inner) => (StatusCode::BAD_GATEWAY, inner.to_string()),
                RoomHubError::Configuration(_) | RoomHubError::Storage(_) => {
                    tracing::error!(error = %err, "internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                    )
                }
            },
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
