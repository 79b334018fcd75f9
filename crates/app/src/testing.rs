//! In-memory fakes of the ports, shared by the engine's unit tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use roomhub_domain::device::{
    CommandOutcome, ConnectResult, ControllerState, Credentials, DeviceCommand, DeviceState,
    DeviceType,
};
use roomhub_domain::dimmer::DimmerConfig;
use roomhub_domain::error::{AdapterError, RoomHubError};
use roomhub_domain::execution::{ActionReport, ExecutionOutcome};
use roomhub_domain::id::ControllerId;
use roomhub_domain::workflow::Workflow;

use crate::ports::{AutomationRepository, DeviceAdapter, Notification, NotificationSink};

// ── Repository ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryRepository {
    workflows: Mutex<Vec<Workflow>>,
    dimmers: Mutex<Vec<DimmerConfig>>,
    controllers: Mutex<HashMap<ControllerId, ControllerState>>,
    outcomes: Mutex<Vec<ExecutionOutcome>>,
}

impl InMemoryRepository {
    pub fn with_controller(self, controller: ControllerState) -> Self {
        self.controllers
            .lock()
            .unwrap()
            .insert(controller.id, controller);
        self
    }

    pub fn with_workflow(self, workflow: Workflow) -> Self {
        self.workflows.lock().unwrap().push(workflow);
        self
    }

    pub fn with_dimmer(self, config: DimmerConfig) -> Self {
        self.dimmers.lock().unwrap().push(config);
        self
    }

    pub fn set_workflows(&self, workflows: Vec<Workflow>) {
        *self.workflows.lock().unwrap() = workflows;
    }

    pub fn outcomes(&self) -> Vec<ExecutionOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl AutomationRepository for InMemoryRepository {
    fn load_active_workflows(
        &self,
    ) -> impl Future<Output = Result<Vec<Workflow>, RoomHubError>> + Send {
        let r: Vec<_> = self
            .workflows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.is_active)
            .cloned()
            .collect();
        async { Ok(r) }
    }

    fn load_active_dimmer_configs(
        &self,
    ) -> impl Future<Output = Result<Vec<DimmerConfig>, RoomHubError>> + Send {
        let r: Vec<_> = self
            .dimmers
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.is_active)
            .cloned()
            .collect();
        async { Ok(r) }
    }

    fn load_device_state(
        &self,
        controller_id: ControllerId,
    ) -> impl Future<Output = Result<Option<ControllerState>, RoomHubError>> + Send {
        let r = self.controllers.lock().unwrap().get(&controller_id).cloned();
        async { Ok(r) }
    }

    fn record_execution_outcome(
        &self,
        outcome: &ExecutionOutcome,
    ) -> impl Future<Output = Result<(), RoomHubError>> + Send {
        self.outcomes.lock().unwrap().push(outcome.clone());
        async { Ok(()) }
    }
}

// ── Notification sink ──────────────────────────────────────────────

#[derive(Default)]
pub struct SpySink {
    received: Mutex<Vec<Notification>>,
}

impl SpySink {
    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    pub fn action_reports(&self) -> Vec<ActionReport> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::ActionReported(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    pub fn outcomes(&self) -> Vec<ExecutionOutcome> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::ExecutionFinished(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }
}

impl NotificationSink for SpySink {
    fn notify(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), RoomHubError>> + Send {
        self.received.lock().unwrap().push(notification);
        async { Ok(()) }
    }
}

// ── Device adapter ─────────────────────────────────────────────────

/// Adapter answering `apply_command` from a script, then echoing the
/// requested level once the script is exhausted.
pub struct ScriptedAdapter {
    brand: String,
    script: Mutex<VecDeque<Result<CommandOutcome, AdapterError>>>,
    calls: Mutex<Vec<(ControllerId, u8, DeviceCommand)>>,
    latency: Duration,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(brand: &str) -> Self {
        Self {
            brand: brand.to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(self, responses: Vec<Result<CommandOutcome, AdapterError>>) -> Self {
        *self.script.lock().unwrap() = responses.into();
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, response: Result<CommandOutcome, AdapterError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<(ControllerId, u8, DeviceCommand)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.calls().into_iter().map(|(_, _, command)| command).collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceAdapter for ScriptedAdapter {
    fn brand(&self) -> &str {
        &self.brand
    }

    async fn connect(
        &self,
        controller_id: ControllerId,
        _credentials: &Credentials,
    ) -> Result<ConnectResult, AdapterError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectResult {
            controller_id,
            metadata: Default::default(),
        })
    }

    async fn disconnect(&self, _controller_id: ControllerId) -> Result<(), AdapterError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn capabilities(
        &self,
        _controller_id: ControllerId,
    ) -> Result<Vec<DeviceState>, AdapterError> {
        Ok(Vec::new())
    }

    async fn apply_command(
        &self,
        controller_id: ControllerId,
        port: u8,
        command: DeviceCommand,
    ) -> Result<CommandOutcome, AdapterError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push((controller_id, port, command));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or(Ok(CommandOutcome {
            actual_value: Some(command.requested_level()),
            previous_value: None,
        }))
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

fn device(port: u8, device_type: DeviceType, name: &str) -> DeviceState {
    DeviceState {
        port,
        device_type,
        name: name.to_string(),
        is_on: false,
        level: 0,
        supports_dimming: true,
        min_level: 0,
        max_level: 100,
    }
}

/// Controller with a fan on port 1 and a light on port 2.
pub fn controller_with_fan(brand: &str) -> ControllerState {
    ControllerState {
        id: ControllerId::new(),
        brand: brand.to_string(),
        name: "Tent A".to_string(),
        credentials: Credentials::default(),
        devices: vec![
            device(1, DeviceType::Fan, "Exhaust"),
            device(2, DeviceType::Light, "LED bar"),
        ],
    }
}
