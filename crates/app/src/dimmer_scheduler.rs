//! Dimmer scheduler: drives sunrise/sunset light ramps.
//!
//! Every tick evaluates each active [`DimmerConfig`] at the local time of
//! day and sends `SetLevel` only when the level moved past the hysteresis
//! threshold since the last successful command for that port. Failures are
//! retried by the next tick; a streak reaching the alert threshold emits a
//! [`Notification::DimmerFailureAlert`], and the first success afterwards a
//! [`Notification::DimmerRecovered`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use roomhub_domain::device::DeviceCommand;
use roomhub_domain::dimmer::{CurveParams, DimmerConfig};
use roomhub_domain::error::RoomHubError;
use roomhub_domain::id::{ControllerId, DimmerConfigId};
use roomhub_domain::time::now;

use crate::action_executor::{ActionExecutor, ActionRequest, RetryPolicy};
use crate::ports::{AutomationRepository, Notification, NotificationSink};

#[derive(Debug, Clone, PartialEq)]
pub struct DimmerSettings {
    pub tick_interval: Duration,
    /// Minimum level change, in intensity units, worth a command.
    pub hysteresis: f64,
    pub failure_alert_threshold: u32,
    pub max_concurrency: usize,
    /// Zone in which sunrise and sunset times are read.
    pub timezone: Tz,
    pub curve: CurveParams,
}

impl Default for DimmerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            hysteresis: 1.0,
            failure_alert_threshold: 5,
            max_concurrency: 8,
            timezone: Tz::UTC,
            curve: CurveParams::default(),
        }
    }
}

/// Counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub commanded: usize,
    pub held: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortTick {
    Commanded,
    Held,
    Failed,
}

pub struct DimmerScheduler<R, N> {
    repo: R,
    sink: N,
    actions: Arc<ActionExecutor<R, N>>,
    settings: DimmerSettings,
    last_commanded: DashMap<(ControllerId, u8), u8>,
    failures: DashMap<DimmerConfigId, u32>,
}

impl<R, N> DimmerScheduler<R, N>
where
    R: AutomationRepository,
    N: NotificationSink,
{
    pub fn new(repo: R, sink: N, actions: Arc<ActionExecutor<R, N>>, settings: DimmerSettings) -> Self {
        Self {
            repo,
            sink,
            actions,
            settings,
            last_commanded: DashMap::new(),
            failures: DashMap::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &DimmerSettings {
        &self.settings
    }

    /// Level last acknowledged for a port, if any.
    #[must_use]
    pub fn last_commanded(&self, controller_id: ControllerId, port: u8) -> Option<u8> {
        self.last_commanded.get(&(controller_id, port)).map(|level| *level)
    }

    /// Evaluate every active config at `at`.
    ///
    /// # Errors
    ///
    /// Returns the repository error when configs cannot be loaded.
    #[instrument(skip(self))]
    pub async fn tick_at(&self, at: DateTime<Utc>) -> Result<TickSummary, RoomHubError> {
        let configs = self.repo.load_active_dimmer_configs().await?;
        let local = at.with_timezone(&self.settings.timezone).time();
        let mut summary = TickSummary::default();

        let mut valid = Vec::with_capacity(configs.len());
        for config in configs {
            if !config.is_active {
                continue;
            }
            match config.validate() {
                Ok(()) => valid.push(config),
                Err(err) => {
                    warn!(config_id = %config.id, error = %err, "dimmer config skipped");
                    summary.skipped += 1;
                }
            }
        }
        self.forget_inactive(&valid);

        let results: Vec<PortTick> = futures::stream::iter(valid)
            .map(|config| self.tick_config(config, local))
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;
        for result in results {
            match result {
                PortTick::Commanded => summary.commanded += 1,
                PortTick::Held => summary.held += 1,
                PortTick::Failed => summary.failed += 1,
            }
        }

        debug!(?summary, "dimmer tick done");
        Ok(summary)
    }

    async fn tick_config(&self, config: DimmerConfig, local: chrono::NaiveTime) -> PortTick {
        let level = config.command_level_at(local, &self.settings.curve);
        let port = (config.controller_id, config.port);
        let previous = self.last_commanded.get(&port).map(|level| *level);
        if !self.worth_sending(previous, level, config.target_intensity) {
            return PortTick::Held;
        }

        let mut request = ActionRequest::for_port(
            config.controller_id,
            config.port,
            DeviceCommand::SetLevel { level },
        );
        request.workflow_id = Some(config.workflow_id);
        let report = self.actions.execute_with(request, RetryPolicy::single()).await;

        if report.success {
            self.last_commanded.insert(port, level);
            self.record_success(&config).await;
            PortTick::Commanded
        } else {
            self.record_failure(&config, report.error).await;
            PortTick::Failed
        }
    }

    fn worth_sending(&self, previous: Option<u8>, level: u8, target: u8) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        if previous == level {
            return false;
        }
        let delta = (f64::from(level) - f64::from(previous)).abs();
        // ramps always land exactly on their endpoints
        delta > self.settings.hysteresis || level == 0 || level == target
    }

    async fn record_failure(&self, config: &DimmerConfig, error: Option<String>) {
        let streak = {
            let mut count = self.failures.entry(config.id).or_insert(0);
            *count += 1;
            *count
        };
        warn!(config_id = %config.id, controller_id = %config.controller_id, port = config.port, streak, error = error.as_deref().unwrap_or("unknown"), "dimmer command failed");

        if streak == self.settings.failure_alert_threshold {
            self.publish(Notification::DimmerFailureAlert {
                config_id: config.id,
                controller_id: config.controller_id,
                port: config.port,
                consecutive_failures: streak,
                last_error: error,
            })
            .await;
        }
    }

    async fn record_success(&self, config: &DimmerConfig) {
        let Some((_, streak)) = self.failures.remove(&config.id) else {
            return;
        };
        if streak >= self.settings.failure_alert_threshold {
            info!(config_id = %config.id, failed_ticks = streak, "dimmer recovered");
            self.publish(Notification::DimmerRecovered {
                config_id: config.id,
                controller_id: config.controller_id,
                port: config.port,
                failed_ticks: streak,
            })
            .await;
        }
    }

    async fn publish(&self, notification: Notification) {
        if let Err(err) = self.sink.notify(notification).await {
            warn!(error = %err, "dimmer notification dropped");
        }
    }

    fn forget_inactive(&self, active: &[DimmerConfig]) {
        let ids: HashSet<DimmerConfigId> = active.iter().map(|config| config.id).collect();
        let ports: HashSet<(ControllerId, u8)> = active
            .iter()
            .map(|config| (config.controller_id, config.port))
            .collect();
        self.failures.retain(|id, _| ids.contains(id));
        self.last_commanded.retain(|port, _| ports.contains(port));
    }

    /// Tick every `tick_interval` until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.tick_at(now()).await {
                        warn!(error = %err, "dimmer tick failed");
                    }
                }
            }
        }
        info!("dimmer scheduler stopped");
    }
}
