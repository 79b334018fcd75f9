//! Trigger dispatcher: turns timers, schedules, sensor readings and manual
//! invocations into fires handed to the [`WorkflowExecutor`].
//!
//! Every loaded workflow owns a cancellation token from which its timer and
//! schedule watches are derived; reloading or deactivating the workflow
//! cancels them. Sensor triggers are edge-triggered: a trigger fires when
//! its comparison goes from unmet to met for a controller, and stale
//! readings neither fire nor move that state. Fires never wait for the
//! execution they start.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use roomhub_domain::cron::Schedule;
use roomhub_domain::error::{GraphError, NotFoundError, RoomHubError};
use roomhub_domain::execution::{ExecutionOutcome, FireEvent};
use roomhub_domain::id::{ControllerId, WorkflowId};
use roomhub_domain::sensor::SensorReading;
use roomhub_domain::time::now;
use roomhub_domain::workflow::{NodeId, TriggerData, Workflow, WorkflowNode};

use crate::ports::{AutomationRepository, NotificationSink};
use crate::sensor_cache::SensorCache;
use crate::workflow_executor::WorkflowExecutor;

/// Edge-trigger memory: one entry per sensor trigger and controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SensorWatchKey {
    workflow_id: WorkflowId,
    node_id: NodeId,
    controller_id: ControllerId,
}

struct LoadedWorkflow {
    workflow: Arc<Workflow>,
    watches: CancellationToken,
}

/// What one [`TriggerDispatcher::sync`] pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub started: usize,
    pub unchanged: usize,
    pub stopped: usize,
    pub rejected: usize,
}

/// Watches the triggers of every active workflow.
pub struct TriggerDispatcher<R, N> {
    repo: R,
    executor: Arc<WorkflowExecutor<R, N>>,
    cache: Arc<SensorCache>,
    workflows: DashMap<WorkflowId, LoadedWorkflow>,
    sensor_states: DashMap<SensorWatchKey, bool>,
    shutdown: CancellationToken,
}

impl<R, N> TriggerDispatcher<R, N>
where
    R: AutomationRepository + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        repo: R,
        executor: Arc<WorkflowExecutor<R, N>>,
        cache: Arc<SensorCache>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repo,
            executor,
            cache,
            workflows: DashMap::new(),
            sensor_states: DashMap::new(),
            shutdown,
        }
    }

    /// Currently loaded workflows.
    #[must_use]
    pub fn workflows(&self) -> Vec<Arc<Workflow>> {
        self.workflows
            .iter()
            .map(|entry| Arc::clone(&entry.workflow))
            .collect()
    }

    #[must_use]
    pub fn workflow(&self, id: WorkflowId) -> Option<Arc<Workflow>> {
        self.workflows.get(&id).map(|entry| Arc::clone(&entry.workflow))
    }

    /// Reconcile loaded workflows with the repository.
    ///
    /// New and changed (by `updated_at`) workflows get fresh watches and an
    /// execution lock; workflows no longer active, or no longer valid, are
    /// stopped and their lock removed.
    ///
    /// # Errors
    ///
    /// Returns the repository error when workflows cannot be loaded; the
    /// current watches are left untouched.
    #[instrument(skip_all)]
    pub async fn sync(self: &Arc<Self>) -> Result<SyncReport, RoomHubError> {
        let loaded = self.repo.load_active_workflows().await?;
        let mut report = SyncReport::default();
        let mut keep = HashSet::with_capacity(loaded.len());

        for workflow in loaded {
            if !workflow.is_active {
                continue;
            }
            if let Err(err) = workflow.validate() {
                warn!(workflow_id = %workflow.id, error = %err, "workflow rejected");
                report.rejected += 1;
                continue;
            }
            keep.insert(workflow.id);
            let unchanged = self
                .workflows
                .get(&workflow.id)
                .is_some_and(|entry| entry.workflow.updated_at == workflow.updated_at);
            if unchanged {
                report.unchanged += 1;
            } else {
                self.start(workflow);
                report.started += 1;
            }
        }

        let gone: Vec<WorkflowId> = self
            .workflows
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| !keep.contains(id))
            .collect();
        for id in gone {
            self.stop(id);
            report.stopped += 1;
        }

        debug!(?report, "workflows synced");
        Ok(report)
    }

    fn start(self: &Arc<Self>, workflow: Workflow) {
        let workflow_id = workflow.id;
        let workflow = Arc::new(workflow);
        let watches = self.shutdown.child_token();

        let previous = self.workflows.insert(
            workflow_id,
            LoadedWorkflow {
                workflow: Arc::clone(&workflow),
                watches: watches.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.watches.cancel();
        }
        self.forget_sensor_state(workflow_id);
        self.executor.locks().register(workflow_id);

        for (node, trigger) in workflow.triggers() {
            match trigger {
                TriggerData::Timer { interval_secs } => self.spawn_timer(
                    workflow_id,
                    node.id.clone(),
                    Duration::from_secs(*interval_secs),
                    watches.clone(),
                ),
                TriggerData::Schedule { cron, timezone } => {
                    match Schedule::parse(cron, timezone.as_deref()) {
                        Ok(schedule) => self.spawn_schedule(
                            workflow_id,
                            node.id.clone(),
                            schedule,
                            watches.clone(),
                        ),
                        Err(err) => {
                            warn!(%workflow_id, node_id = %node.id, error = %err, "schedule not watched");
                        }
                    }
                }
                TriggerData::Sensor { .. } | TriggerData::Manual => {}
            }
        }
        info!(%workflow_id, name = %workflow.name, "workflow loaded");
    }

    fn stop(&self, workflow_id: WorkflowId) {
        if let Some((_, loaded)) = self.workflows.remove(&workflow_id) {
            loaded.watches.cancel();
        }
        self.forget_sensor_state(workflow_id);
        self.executor.locks().unregister(workflow_id);
        info!(%workflow_id, "workflow unloaded");
    }

    /// Stop every watch and unload every workflow.
    pub fn stop_all(&self) {
        let ids: Vec<WorkflowId> = self.workflows.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.stop(id);
        }
    }

    fn forget_sensor_state(&self, workflow_id: WorkflowId) {
        self.sensor_states
            .retain(|key, _| key.workflow_id != workflow_id);
    }

    fn spawn_timer(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        node_id: NodeId,
        period: Duration,
        token: CancellationToken,
    ) {
        let Some(first) = tokio::time::Instant::now().checked_add(period) else {
            warn!(%workflow_id, %node_id, ?period, "timer interval out of range, not watched");
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            // first fire one period after activation; missed ticks drift
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        this.fire(FireEvent::new(workflow_id, node_id.clone(), now()));
                    }
                }
            }
        });
    }

    fn spawn_schedule(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        node_id: NodeId,
        schedule: Schedule,
        token: CancellationToken,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut after = now();
            loop {
                let Some(next) = schedule.next_after(after.max(now())) else {
                    warn!(%workflow_id, %node_id, "schedule has no future instant");
                    break;
                };
                let wait = (next - now()).to_std().unwrap_or_default();
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(wait) => {
                        this.fire(FireEvent::new(workflow_id, node_id.clone(), next));
                    }
                }
                after = next;
            }
        });
    }

    /// Hand a fire to the executor without waiting for it.
    ///
    /// Returns `None` when the workflow is not loaded.
    pub fn fire(&self, event: FireEvent) -> Option<JoinHandle<ExecutionOutcome>> {
        let Some(workflow) = self.workflow(event.workflow_id) else {
            debug!(workflow_id = %event.workflow_id, "fire for unloaded workflow dropped");
            return None;
        };
        let executor = Arc::clone(&self.executor);
        Some(tokio::spawn(async move {
            executor.execute(workflow, event).await
        }))
    }

    /// Cache a reading and fire every sensor trigger it moves from unmet
    /// to met. Returns the fires handed off.
    pub fn ingest(&self, reading: SensorReading) -> Vec<FireEvent> {
        let at = now();
        if !self.cache.update(reading.clone()) {
            debug!(sensor = ?reading.key(), "older reading ignored");
            return Vec::new();
        }
        if self.cache.is_stale(&reading, at) {
            debug!(sensor = ?reading.key(), "stale reading cannot fire triggers");
            return Vec::new();
        }

        let mut fires = Vec::new();
        for workflow in self.workflows() {
            for (node, trigger) in workflow.triggers() {
                let TriggerData::Sensor {
                    sensor_type,
                    operator,
                    threshold,
                    controller_id,
                } = trigger
                else {
                    continue;
                };
                if *sensor_type != reading.sensor_type
                    || controller_id.is_some_and(|id| id != reading.controller_id)
                {
                    continue;
                }

                let satisfied = operator.apply(reading.value, *threshold);
                let key = SensorWatchKey {
                    workflow_id: workflow.id,
                    node_id: node.id.clone(),
                    controller_id: reading.controller_id,
                };
                let was_satisfied = self.sensor_states.insert(key, satisfied).unwrap_or(false);
                if satisfied && !was_satisfied {
                    debug!(workflow_id = %workflow.id, node_id = %node.id, value = reading.value, "sensor trigger crossed");
                    fires.push(
                        FireEvent::new(workflow.id, node.id.clone(), at)
                            .with_origin(reading.controller_id),
                    );
                }
            }
        }

        for event in &fires {
            self.fire(event.clone());
        }
        fires
    }

    /// Fire a manual trigger on behalf of an external caller.
    ///
    /// With `wait`, runs the execution to completion and returns its
    /// outcome; otherwise hands it off and returns `None`.
    ///
    /// # Errors
    ///
    /// - [`RoomHubError::NotFound`] when the workflow is not loaded
    /// - [`RoomHubError::Graph`] ([`GraphError::UnknownTrigger`]) when the
    ///   node is not a manual trigger of that workflow
    #[instrument(skip(self), fields(%workflow_id, %node_id))]
    pub async fn fire_manual(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        wait: bool,
    ) -> Result<Option<ExecutionOutcome>, RoomHubError> {
        let workflow = self.workflow(workflow_id).ok_or_else(|| NotFoundError {
            entity: "Workflow",
            id: workflow_id.to_string(),
        })?;
        let is_manual = matches!(
            workflow.node(&node_id).and_then(WorkflowNode::as_trigger),
            Some(TriggerData::Manual)
        );
        if !is_manual {
            return Err(GraphError::UnknownTrigger {
                node_id: node_id.to_string(),
            }
            .into());
        }

        let event = FireEvent::new(workflow_id, node_id, now());
        if wait {
            Ok(Some(self.executor.execute(workflow, event).await))
        } else {
            self.fire(event);
            Ok(None)
        }
    }

    /// Reload workflows every `reload_interval` and ingest readings from
    /// `readings` until shutdown, then stop every watch.
    pub async fn run(
        self: Arc<Self>,
        mut readings: mpsc::Receiver<SensorReading>,
        reload_interval: Duration,
    ) {
        let mut reload = tokio::time::interval(reload_interval);
        reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut feed_open = true;

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = reload.tick() => {
                    if let Err(err) = self.sync().await {
                        warn!(error = %err, "workflow reload failed");
                    }
                }
                reading = readings.recv(), if feed_open => match reading {
                    Some(reading) => {
                        self.ingest(reading);
                    }
                    None => {
                        debug!("ingestion feed closed");
                        feed_open = false;
                    }
                },
            }
        }

        self.stop_all();
        info!("trigger dispatcher stopped");
    }
}
