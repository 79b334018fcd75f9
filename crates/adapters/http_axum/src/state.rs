//! Shared application state for axum handlers.

use std::sync::Arc;

use tokio::sync::mpsc;

use roomhub_app::ports::{AutomationRepository, NotificationSink};
use roomhub_app::sensor_cache::SensorCache;
use roomhub_app::trigger_dispatcher::TriggerDispatcher;
use roomhub_domain::sensor::SensorReading;

/// Application state shared across all axum handlers.
///
/// Generic over the repository and notification sink of the engine to avoid
/// dynamic dispatch. `Clone` is implemented manually so `R` and `N` need not
/// be `Clone`.
pub struct AppState<R, N> {
    pub dispatcher: Arc<TriggerDispatcher<R, N>>,
    pub cache: Arc<SensorCache>,
    /// Ingestion feed consumed by the dispatcher loop.
    pub readings: mpsc::Sender<SensorReading>,
}

impl<R, N> Clone for AppState<R, N> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            cache: Arc::clone(&self.cache),
            readings: self.readings.clone(),
        }
    }
}

impl<R, N> AppState<R, N>
where
    R: AutomationRepository + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        dispatcher: Arc<TriggerDispatcher<R, N>>,
        cache: Arc<SensorCache>,
        readings: mpsc::Sender<SensorReading>,
    ) -> Self {
        Self {
            dispatcher,
            cache,
            readings,
        }
    }
}
