//! JSON API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod readings;
#[allow(clippy::missing_errors_doc)]
pub mod workflows;

use axum::Router;
use axum::routing::{get, post};

use roomhub_app::ports::{AutomationRepository, NotificationSink};

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<R, N>() -> Router<AppState<R, N>>
where
    R: AutomationRepository + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route("/workflows", get(workflows::list::<R, N>))
        .route(
            "/workflows/{id}/triggers/{node_id}/fire",
            post(workflows::fire::<R, N>),
        )
        .route(
            "/readings",
            get(readings::list::<R, N>).post(readings::ingest::<R, N>),
        )
}
