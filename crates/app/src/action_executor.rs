//! Action executor: turns an action into an adapter call.
//!
//! Resolution order for the target: explicit controller, else the
//! controller whose reading fired the trigger; explicit port, else the
//! lowest port whose device type matches the action. Transient adapter
//! failures ([`AdapterError::is_retryable`]) are retried with a fixed
//! backoff; every invocation is reported to the notification sink.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use roomhub_domain::device::{ControllerState, DeviceCommand, DeviceType};
use roomhub_domain::error::AdapterError;
use roomhub_domain::execution::ActionReport;
use roomhub_domain::id::{ControllerId, WorkflowId};
use roomhub_domain::workflow::{ActionData, NodeId};

use crate::ports::{AdapterRegistry, AutomationRepository, DeviceAdapter, Notification, NotificationSink};

/// How many times a transient failure is retried, and how long to wait
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// One attempt, no retry. Used by callers that retry on their own
    /// schedule.
    #[must_use]
    pub fn single() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// What an action points at, before resolution against the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionTarget {
    pub controller_id: Option<ControllerId>,
    pub port: Option<u8>,
    pub device_type: Option<DeviceType>,
}

/// One command to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub node_id: Option<NodeId>,
    pub workflow_id: Option<WorkflowId>,
    pub target: ActionTarget,
    pub command: DeviceCommand,
}

impl ActionRequest {
    /// Request for an action node, falling back to `origin` when the node
    /// names no controller.
    #[must_use]
    pub fn from_node(
        workflow_id: WorkflowId,
        node_id: NodeId,
        action: &ActionData,
        origin: Option<ControllerId>,
    ) -> Self {
        Self {
            node_id: Some(node_id),
            workflow_id: Some(workflow_id),
            target: ActionTarget {
                controller_id: action.controller_id.or(origin),
                port: action.port,
                device_type: action.target_device_type(),
            },
            command: action.command(),
        }
    }

    /// Request for a known controller port.
    #[must_use]
    pub fn for_port(controller_id: ControllerId, port: u8, command: DeviceCommand) -> Self {
        Self {
            node_id: None,
            workflow_id: None,
            target: ActionTarget {
                controller_id: Some(controller_id),
                port: Some(port),
                device_type: None,
            },
            command,
        }
    }
}

/// Why a request never reached an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unresolved {
    NoController,
    UnknownController,
    NoPort,
    UnknownBrand,
    Storage,
}

impl Unresolved {
    fn code(self) -> &'static str {
        match self {
            Self::NoController | Self::NoPort => "unresolved_target",
            Self::UnknownController => "unknown_controller",
            Self::UnknownBrand => "unknown_brand",
            Self::Storage => "storage",
        }
    }
}

struct Resolved {
    controller: ControllerState,
    port: u8,
    adapter: Arc<dyn DeviceAdapter>,
}

/// Executes [`ActionRequest`]s through brand adapters.
pub struct ActionExecutor<R, N> {
    repo: R,
    sink: N,
    registry: AdapterRegistry,
    /// Controllers with an established session, and their brand.
    sessions: DashMap<ControllerId, String>,
    policy: RetryPolicy,
    command_timeout: Duration,
}

impl<R, N> ActionExecutor<R, N>
where
    R: AutomationRepository,
    N: NotificationSink,
{
    /// Create an executor with the default retry policy and a 10 s
    /// per-call timeout.
    pub fn new(repo: R, sink: N, registry: AdapterRegistry) -> Self {
        Self {
            repo,
            sink,
            registry,
            sessions: DashMap::new(),
            policy: RetryPolicy::default(),
            command_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Execute with the configured retry policy.
    pub async fn execute(&self, request: ActionRequest) -> ActionReport {
        self.execute_with(request, self.policy).await
    }

    /// Execute with an explicit retry policy. Never fails: every outcome,
    /// including unresolvable targets, is described by the report.
    #[instrument(
        skip_all,
        fields(
            node_id = request.node_id.as_ref().map(tracing::field::display),
            command = %request.command,
        )
    )]
    pub async fn execute_with(&self, request: ActionRequest, policy: RetryPolicy) -> ActionReport {
        let mut report = ActionReport {
            node_id: request.node_id.clone(),
            workflow_id: request.workflow_id,
            controller_id: request.target.controller_id,
            port: request.target.port,
            command: request.command,
            requested: request.command.requested_level(),
            actual: None,
            previous: None,
            attempts: 0,
            success: false,
            error: None,
        };

        match self.resolve(&request.target).await {
            Ok(resolved) => {
                report.controller_id = Some(resolved.controller.id);
                report.port = Some(resolved.port);
                self.run_attempts(&resolved, request.command, policy, &mut report)
                    .await;
            }
            Err(reason) => {
                warn!(?reason, target = ?request.target, "action target could not be resolved");
                report.error = Some(reason.code().to_string());
            }
        }

        if let Err(err) = self
            .sink
            .notify(Notification::ActionReported(report.clone()))
            .await
        {
            warn!(error = %err, "failed to publish action report");
        }
        report
    }

    async fn resolve(&self, target: &ActionTarget) -> Result<Resolved, Unresolved> {
        let controller_id = target.controller_id.ok_or(Unresolved::NoController)?;
        let controller = self
            .repo
            .load_device_state(controller_id)
            .await
            .map_err(|err| {
                warn!(%controller_id, error = %err, "failed to load controller");
                Unresolved::Storage
            })?
            .ok_or(Unresolved::UnknownController)?;

        let port = match (target.port, target.device_type) {
            (Some(port), _) => port,
            (None, Some(device_type)) => controller
                .first_of_type(device_type)
                .map(|device| device.port)
                .ok_or(Unresolved::NoPort)?,
            (None, None) => return Err(Unresolved::NoPort),
        };

        let adapter = self.registry.get(&controller.brand).map_err(|err| {
            warn!(error = %err, "controller brand has no adapter");
            Unresolved::UnknownBrand
        })?;

        Ok(Resolved {
            controller,
            port,
            adapter,
        })
    }

    async fn run_attempts(
        &self,
        resolved: &Resolved,
        command: DeviceCommand,
        policy: RetryPolicy,
        report: &mut ActionReport,
    ) {
        let max_attempts = policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            report.attempts = attempt;
            let call = self.attempt(resolved, command);
            let result = tokio::time::timeout(self.command_timeout, call)
                .await
                .unwrap_or(Err(AdapterError::Timeout));

            match result {
                Ok(outcome) => {
                    report.success = true;
                    report.error = None;
                    report.actual = outcome.actual_value;
                    report.previous = outcome.previous_value;
                    debug!(attempt, actual = ?outcome.actual_value, "command applied");
                    return;
                }
                Err(err) => {
                    report.error = Some(err.kind().to_string());
                    if matches!(err, AdapterError::Unreachable(_) | AdapterError::AuthFailed(_)) {
                        self.sessions.remove(&resolved.controller.id);
                    }
                    if !err.is_retryable() || attempt == max_attempts {
                        warn!(
                            controller_id = %resolved.controller.id,
                            port = resolved.port,
                            attempt,
                            error = %err,
                            "command failed"
                        );
                        return;
                    }
                    debug!(attempt, error = %err, "transient failure, retrying");
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        resolved: &Resolved,
        command: DeviceCommand,
    ) -> Result<roomhub_domain::device::CommandOutcome, AdapterError> {
        let controller = &resolved.controller;
        if !self.sessions.contains_key(&controller.id) {
            let connected = resolved
                .adapter
                .connect(controller.id, &controller.credentials)
                .await?;
            debug!(controller_id = %connected.controller_id, "session established");
            self.sessions.insert(controller.id, controller.brand.clone());
        }
        resolved
            .adapter
            .apply_command(controller.id, resolved.port, command)
            .await
    }

    /// Close every open session. Failures are logged and ignored.
    pub async fn disconnect_all(&self) {
        let sessions: Vec<(ControllerId, String)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (controller_id, brand) in sessions {
            self.sessions.remove(&controller_id);
            let Ok(adapter) = self.registry.get(&brand) else {
                continue;
            };
            if let Err(err) = adapter.disconnect(controller_id).await {
                warn!(%controller_id, error = %err, "disconnect failed");
            }
        }
    }

    /// Number of controllers with an open session.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryRepository, ScriptedAdapter, SpySink, controller_with_fan};
    use roomhub_domain::device::CommandOutcome;
    use roomhub_domain::workflow::ActionKind;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    fn setup(
        adapter: Arc<ScriptedAdapter>,
    ) -> (
        ActionExecutor<Arc<InMemoryRepository>, Arc<SpySink>>,
        ControllerId,
        Arc<SpySink>,
    ) {
        let controller = controller_with_fan(adapter.brand());
        let id = controller.id;
        let repo = Arc::new(InMemoryRepository::default().with_controller(controller));
        let sink = Arc::new(SpySink::default());
        let registry = AdapterRegistry::new().with(adapter);
        let executor = ActionExecutor::new(repo, Arc::clone(&sink), registry).with_policy(fast_policy());
        (executor, id, sink)
    }

    fn set_fan(level: u8) -> ActionData {
        ActionData {
            action: ActionKind::SetFan,
            controller_id: None,
            device_type: None,
            port: None,
            level: Some(level),
        }
    }

    #[tokio::test]
    async fn should_succeed_on_third_attempt_when_adapter_fails_twice() {
        let adapter = Arc::new(ScriptedAdapter::new("acme").script(vec![
            Err(AdapterError::Unreachable("link down".to_string())),
            Err(AdapterError::Timeout),
            Ok(CommandOutcome {
                actual_value: Some(77),
                previous_value: Some(0),
            }),
        ]));
        let (executor, controller_id, _) = setup(Arc::clone(&adapter));

        let report = executor
            .execute(ActionRequest::for_port(controller_id, 1, DeviceCommand::SetLevel { level: 80 }))
            .await;

        assert!(report.success);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.actual, Some(77));
        assert_eq!(report.requested, 80);
        assert!(report.error.is_none());
        assert_eq!(adapter.calls().len(), 3);
    }

    #[tokio::test]
    async fn should_not_retry_terminal_failure() {
        let adapter = Arc::new(
            ScriptedAdapter::new("acme").script(vec![Err(AdapterError::InvalidPort(9))]),
        );
        let (executor, controller_id, _) = setup(Arc::clone(&adapter));

        let report = executor
            .execute(ActionRequest::for_port(controller_id, 9, DeviceCommand::TurnOn))
            .await;

        assert!(!report.success);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.error.as_deref(), Some("invalid_port"));
    }

    #[tokio::test]
    async fn should_give_up_after_retry_budget() {
        let adapter = Arc::new(ScriptedAdapter::new("acme").script(vec![
            Err(AdapterError::Timeout),
            Err(AdapterError::Timeout),
            Err(AdapterError::Timeout),
            Ok(CommandOutcome {
                actual_value: Some(1),
                previous_value: None,
            }),
        ]));
        let (executor, controller_id, _) = setup(Arc::clone(&adapter));

        let report = executor
            .execute(ActionRequest::for_port(controller_id, 1, DeviceCommand::TurnOff))
            .await;

        assert!(!report.success);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn should_resolve_port_from_device_type_and_origin_controller() {
        let adapter = Arc::new(ScriptedAdapter::new("acme"));
        let (executor, controller_id, _) = setup(Arc::clone(&adapter));

        let request =
            ActionRequest::from_node(WorkflowId::new(), NodeId::from("a1"), &set_fan(60), Some(controller_id));
        let report = executor.execute(request).await;

        assert!(report.success);
        assert_eq!(report.port, Some(1));
        assert_eq!(
            adapter.calls(),
            vec![(controller_id, 1, DeviceCommand::SetLevel { level: 60 })]
        );
    }

    #[tokio::test]
    async fn should_report_unresolved_target_without_calling_adapter() {
        let adapter = Arc::new(ScriptedAdapter::new("acme"));
        let (executor, _, sink) = setup(Arc::clone(&adapter));

        let request = ActionRequest::from_node(WorkflowId::new(), NodeId::from("a1"), &set_fan(60), None);
        let report = executor.execute(request).await;

        assert!(!report.success);
        assert_eq!(report.attempts, 0);
        assert_eq!(report.error.as_deref(), Some("unresolved_target"));
        assert!(adapter.calls().is_empty());
        assert_eq!(sink.action_reports().len(), 1);
    }

    #[tokio::test]
    async fn should_report_unknown_brand_as_configuration_failure() {
        let adapter = Arc::new(ScriptedAdapter::new("acme"));
        let controller = controller_with_fan("other-brand");
        let id = controller.id;
        let repo = Arc::new(InMemoryRepository::default().with_controller(controller));
        let executor = ActionExecutor::new(
            repo,
            Arc::new(SpySink::default()),
            AdapterRegistry::new().with(adapter),
        );

        let report = executor
            .execute(ActionRequest::for_port(id, 1, DeviceCommand::TurnOn))
            .await;
        assert_eq!(report.error.as_deref(), Some("unknown_brand"));
    }

    #[tokio::test]
    async fn should_connect_once_and_reuse_session() {
        let adapter = Arc::new(ScriptedAdapter::new("acme"));
        let (executor, controller_id, _) = setup(Arc::clone(&adapter));

        for level in [10, 20, 30] {
            executor
                .execute(ActionRequest::for_port(controller_id, 1, DeviceCommand::SetLevel { level }))
                .await;
        }

        assert_eq!(adapter.connect_count(), 1);
        assert_eq!(executor.session_count(), 1);
        executor.disconnect_all().await;
        assert_eq!(executor.session_count(), 0);
        assert_eq!(adapter.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn should_reconnect_after_unreachable() {
        let adapter = Arc::new(ScriptedAdapter::new("acme").script(vec![
            Err(AdapterError::Unreachable("reset".to_string())),
        ]));
        let (executor, controller_id, _) = setup(Arc::clone(&adapter));

        let report = executor
            .execute(ActionRequest::for_port(controller_id, 1, DeviceCommand::TurnOn))
            .await;

        assert!(report.success);
        assert_eq!(adapter.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_map_slow_adapter_call_to_timeout() {
        let adapter = Arc::new(ScriptedAdapter::new("acme").latency(Duration::from_secs(30)));
        let (executor, controller_id, _) = setup(Arc::clone(&adapter));
        let executor = executor.with_command_timeout(Duration::from_secs(1));

        let report = executor
            .execute_with(
                ActionRequest::for_port(controller_id, 1, DeviceCommand::TurnOn),
                RetryPolicy::single(),
            )
            .await;

        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("timeout"));
    }
}
