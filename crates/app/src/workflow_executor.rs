//! Workflow graph executor: one run of a workflow from a fired trigger.
//!
//! Traversal keeps a work-list of `(node, visited-on-this-path)` steps,
//! polled concurrently so sibling branches and delays on one path never
//! hold up another. A condition is evaluated once and only its matching
//! branch edges are followed; an action continues along every outgoing
//! edge whatever its result. The execution completes when every path has
//! ended.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use roomhub_domain::condition::evaluate;
use roomhub_domain::error::GraphError;
use roomhub_domain::execution::{
    ActionReport, ExecutionError, ExecutionOutcome, ExecutionStatus, FireEvent, OutcomeReason,
};
use roomhub_domain::id::ExecutionId;
use roomhub_domain::time::{Timestamp, now};
use roomhub_domain::workflow::{
    Branch, ConditionData, NodeData, NodeId, Workflow, WorkflowEdge, WorkflowGraph, WorkflowNode,
};

use crate::action_executor::{ActionExecutor, ActionRequest};
use crate::execution_locks::ExecutionLocks;
use crate::ports::{AutomationRepository, Notification, NotificationSink};
use crate::sensor_cache::SensorCache;

/// Everything one path step produced.
struct Step<'a> {
    visited: HashSet<&'a NodeId>,
    follow: Vec<&'a WorkflowEdge>,
    report: Option<ActionReport>,
    error: Option<ExecutionError>,
}

/// Collected results of a running execution.
struct Run {
    started_at: Timestamp,
    errors: Vec<ExecutionError>,
    actions: Vec<ActionReport>,
}

impl Run {
    fn finish(
        self,
        fire: &FireEvent,
        status: ExecutionStatus,
        reason: Option<OutcomeReason>,
    ) -> ExecutionOutcome {
        ExecutionOutcome {
            execution_id: ExecutionId::new(),
            workflow_id: fire.workflow_id,
            trigger_node_id: fire.trigger_node_id.clone(),
            fired_at: fire.fired_at,
            started_at: self.started_at,
            finished_at: now(),
            status,
            reason,
            errors: self.errors,
            actions: self.actions,
        }
    }
}

/// Runs workflow graphs, at most one execution per workflow at a time.
pub struct WorkflowExecutor<R, N> {
    repo: R,
    sink: N,
    actions: Arc<ActionExecutor<R, N>>,
    cache: Arc<SensorCache>,
    locks: Arc<ExecutionLocks>,
    shutdown: CancellationToken,
}

impl<R, N> WorkflowExecutor<R, N>
where
    R: AutomationRepository,
    N: NotificationSink,
{
    pub fn new(
        repo: R,
        sink: N,
        actions: Arc<ActionExecutor<R, N>>,
        cache: Arc<SensorCache>,
        locks: Arc<ExecutionLocks>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repo,
            sink,
            actions,
            cache,
            locks,
            shutdown,
        }
    }

    #[must_use]
    pub fn locks(&self) -> &Arc<ExecutionLocks> {
        &self.locks
    }

    /// Run `workflow` from the trigger named in `fire`, then record and
    /// publish the outcome.
    ///
    /// Never fails: graph errors, skipped fires and action failures are
    /// all described by the returned outcome.
    #[instrument(
        skip_all,
        fields(workflow_id = %fire.workflow_id, trigger = %fire.trigger_node_id)
    )]
    pub async fn execute(&self, workflow: Arc<Workflow>, fire: FireEvent) -> ExecutionOutcome {
        let outcome = self.run(&workflow, &fire).await;
        info!(
            status = %outcome.status,
            reason = ?outcome.reason,
            actions = outcome.actions.len(),
            errors = outcome.errors.len(),
            "execution finished"
        );

        if let Err(err) = self.repo.record_execution_outcome(&outcome).await {
            warn!(error = %err, "failed to record execution outcome");
        }
        if let Err(err) = self
            .sink
            .notify(Notification::ExecutionFinished(outcome.clone()))
            .await
        {
            warn!(error = %err, "failed to publish execution outcome");
        }
        outcome
    }

    async fn run(&self, workflow: &Workflow, fire: &FireEvent) -> ExecutionOutcome {
        if !workflow.is_active {
            return ExecutionOutcome::skipped(fire, OutcomeReason::WorkflowInactive);
        }
        let _guard = match self.locks.try_acquire(workflow.id) {
            Ok(guard) => guard,
            Err(reason) => {
                debug!(?reason, "fire skipped");
                return ExecutionOutcome::skipped(fire, reason);
            }
        };

        let mut run = Run {
            started_at: now(),
            errors: Vec::new(),
            actions: Vec::new(),
        };

        let prepared = WorkflowGraph::new(workflow).and_then(|graph| {
            let (trigger, _) = graph.trigger(&fire.trigger_node_id)?;
            graph.check_acyclic_from(&trigger.id)?;
            Ok((graph, trigger))
        });
        let (graph, trigger) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(error = %err, "workflow rejected at execution start");
                return run.finish(fire, ExecutionStatus::Failed, Some(OutcomeReason::from(&err)));
            }
        };

        if let Err(err) = self.traverse(&graph, trigger, fire, &mut run).await {
            warn!(error = %err, "traversal aborted");
            return run.finish(fire, ExecutionStatus::Failed, Some(OutcomeReason::from(&err)));
        }

        let interrupted = run
            .errors
            .iter()
            .any(|err| matches!(err, ExecutionError::DelayInterrupted { .. }));
        if interrupted {
            run.finish(fire, ExecutionStatus::Failed, Some(OutcomeReason::Interrupted))
        } else {
            run.finish(fire, ExecutionStatus::Completed, None)
        }
    }

    async fn traverse<'a>(
        &self,
        graph: &WorkflowGraph<'a>,
        trigger: &'a WorkflowNode,
        fire: &FireEvent,
        run: &mut Run,
    ) -> Result<(), GraphError> {
        let mut pending = FuturesUnordered::new();

        let root = HashSet::from([&trigger.id]);
        for (node, visited) in successors(graph, graph.outgoing(&trigger.id), &root)? {
            pending.push(self.visit(graph, node, visited, fire));
        }

        while let Some(step) = pending.next().await {
            run.actions.extend(step.report);
            run.errors.extend(step.error);
            for (node, visited) in successors(graph, &step.follow, &step.visited)? {
                pending.push(self.visit(graph, node, visited, fire));
            }
        }
        Ok(())
    }

    async fn visit<'a>(
        &self,
        graph: &WorkflowGraph<'a>,
        node: &'a WorkflowNode,
        visited: HashSet<&'a NodeId>,
        fire: &FireEvent,
    ) -> Step<'a> {
        let mut step = Step {
            visited,
            follow: Vec::new(),
            report: None,
            error: None,
        };

        match &node.data {
            NodeData::Trigger(_) => {
                debug!(node_id = %node.id, "path reached another trigger; it stays inert");
            }
            NodeData::Condition(condition) => {
                let met = self.evaluate_condition(condition, fire);
                debug!(node_id = %node.id, %condition, met, "condition evaluated");
                step.follow = graph.branch_edges(&node.id, Branch::from(met));
            }
            NodeData::Action(action) => {
                let request = ActionRequest::from_node(
                    fire.workflow_id,
                    node.id.clone(),
                    action,
                    fire.origin_controller,
                );
                let report = self.actions.execute(request).await;
                if !report.success {
                    step.error = Some(ExecutionError::ActionFailed {
                        node_id: node.id.clone(),
                        error: report.error.clone().unwrap_or_default(),
                    });
                }
                step.report = Some(report);
                step.follow = graph.outgoing(&node.id).to_vec();
            }
            NodeData::Delay(delay) => {
                tokio::select! {
                    () = self.shutdown.cancelled() => {
                        debug!(node_id = %node.id, "delay interrupted");
                        step.error = Some(ExecutionError::DelayInterrupted {
                            node_id: node.id.clone(),
                        });
                    }
                    () = tokio::time::sleep(Duration::from_secs(delay.duration_secs)) => {
                        step.follow = graph.outgoing(&node.id).to_vec();
                    }
                }
            }
        }
        step
    }

    /// A missing reading counts as "not met". Stale readings still answer.
    fn evaluate_condition(&self, condition: &ConditionData, fire: &FireEvent) -> bool {
        let controller = condition.controller_id.or(fire.origin_controller);
        let value = self
            .cache
            .latest(controller, condition.sensor_type)
            .map(|reading| reading.value);
        evaluate(value, condition.operator, condition.threshold)
    }
}

/// Targets of `edges` with their extended visited sets.
///
/// # Errors
///
/// [`GraphError::CycleDetected`] when a target was already visited on this
/// path.
fn successors<'a>(
    graph: &WorkflowGraph<'a>,
    edges: &[&'a WorkflowEdge],
    visited: &HashSet<&'a NodeId>,
) -> Result<Vec<(&'a WorkflowNode, HashSet<&'a NodeId>)>, GraphError> {
    edges
        .iter()
        .map(|edge| {
            let node = graph.node(&edge.target).ok_or_else(|| GraphError::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: edge.target.to_string(),
            })?;
            if visited.contains(&node.id) {
                return Err(GraphError::CycleDetected {
                    node_id: node.id.to_string(),
                });
            }
            let mut path = visited.clone();
            path.insert(&node.id);
            Ok((node, path))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_executor::RetryPolicy;
    use crate::ports::AdapterRegistry;
    use crate::testing::{InMemoryRepository, ScriptedAdapter, SpySink, controller_with_fan};
    use roomhub_domain::condition::ComparisonOperator;
    use roomhub_domain::device::{DeviceCommand, DeviceType};
    use roomhub_domain::error::AdapterError;
    use roomhub_domain::id::ControllerId;
    use roomhub_domain::sensor::{SensorReading, SensorType};
    use roomhub_domain::workflow::{ActionData, ActionKind, DelayData, TriggerData, WorkflowEdge};

    struct Harness {
        executor: Arc<WorkflowExecutor<Arc<InMemoryRepository>, Arc<SpySink>>>,
        adapter: Arc<ScriptedAdapter>,
        repo: Arc<InMemoryRepository>,
        cache: Arc<SensorCache>,
        shutdown: CancellationToken,
        controller_id: ControllerId,
    }

    fn harness(adapter: ScriptedAdapter) -> Harness {
        let adapter = Arc::new(adapter);
        let controller = controller_with_fan("acme");
        let controller_id = controller.id;
        let repo = Arc::new(InMemoryRepository::default().with_controller(controller));
        let sink = Arc::new(SpySink::default());
        let cache = Arc::new(SensorCache::new(chrono::Duration::minutes(5)));
        let locks = Arc::new(ExecutionLocks::new());
        let shutdown = CancellationToken::new();
        let actions = Arc::new(
            ActionExecutor::new(
                Arc::clone(&repo),
                Arc::clone(&sink),
                AdapterRegistry::new().with(Arc::<ScriptedAdapter>::clone(&adapter)),
            )
            .with_policy(RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            }),
        );
        let executor = Arc::new(WorkflowExecutor::new(
            Arc::clone(&repo),
            sink,
            actions,
            Arc::clone(&cache),
            locks,
            shutdown.clone(),
        ));
        Harness {
            executor,
            adapter,
            repo,
            cache,
            shutdown,
            controller_id,
        }
    }

    impl Harness {
        fn load(&self, workflow: Workflow) -> Arc<Workflow> {
            self.executor.locks().register(workflow.id);
            Arc::new(workflow)
        }

        async fn fire(&self, workflow: &Arc<Workflow>) -> ExecutionOutcome {
            let fire = FireEvent::new(workflow.id, NodeId::from("t1"), now());
            self.executor.execute(Arc::clone(workflow), fire).await
        }

        fn set_fan(&self, id: &str, level: u8) -> WorkflowNode {
            self.action_on(id, Some(self.controller_id), None, level)
        }

        fn action_on(
            &self,
            id: &str,
            controller_id: Option<ControllerId>,
            port: Option<u8>,
            level: u8,
        ) -> WorkflowNode {
            WorkflowNode::new(
                id,
                NodeData::Action(ActionData {
                    action: ActionKind::SetFan,
                    controller_id,
                    device_type: Some(DeviceType::Fan),
                    port,
                    level: Some(level),
                }),
            )
        }

        fn temperature(&self, value: f64) {
            self.cache.update(SensorReading {
                controller_id: self.controller_id,
                sensor_id: "probe".to_string(),
                sensor_type: SensorType::Temperature,
                value,
                unit: None,
                timestamp: now(),
            });
        }
    }

    fn manual(id: &str) -> WorkflowNode {
        WorkflowNode::new(id, NodeData::Trigger(TriggerData::Manual))
    }

    fn hotter_than(id: &str, threshold: f64) -> WorkflowNode {
        WorkflowNode::new(
            id,
            NodeData::Condition(ConditionData {
                sensor_type: SensorType::Temperature,
                operator: ComparisonOperator::GreaterThan,
                threshold,
                unit: None,
                controller_id: None,
            }),
        )
    }

    fn delay(id: &str, secs: u64) -> WorkflowNode {
        WorkflowNode::new(id, NodeData::Delay(DelayData { duration_secs: secs }))
    }

    fn branching_workflow(h: &Harness) -> Workflow {
        Workflow::builder()
            .name("heat response")
            .node(manual("t1"))
            .node(hotter_than("c1", 80.0))
            .node(h.set_fan("hot", 100))
            .node(h.set_fan("cold", 20))
            .edge(WorkflowEdge::new("e1", "t1", "c1"))
            .edge(WorkflowEdge::new("e2", "c1", "hot").with_branch(Branch::True))
            .edge(WorkflowEdge::new("e3", "c1", "cold").with_branch(Branch::False))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_take_true_branch_only_when_condition_met() {
        let h = harness(ScriptedAdapter::new("acme"));
        h.temperature(85.0);
        let wf = h.load(branching_workflow(&h));

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(h.adapter.commands(), vec![DeviceCommand::SetLevel { level: 100 }]);
        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(h.repo.outcomes().len(), 1);
    }

    #[tokio::test]
    async fn should_take_false_branch_when_reading_missing() {
        let h = harness(ScriptedAdapter::new("acme"));
        let wf = h.load(branching_workflow(&h));

        h.fire(&wf).await;

        assert_eq!(h.adapter.commands(), vec![DeviceCommand::SetLevel { level: 20 }]);
    }

    #[tokio::test]
    async fn should_end_path_when_no_edge_carries_matching_branch() {
        let h = harness(ScriptedAdapter::new("acme"));
        h.temperature(60.0);
        let wf = Workflow::builder()
            .name("only when hot")
            .node(manual("t1"))
            .node(hotter_than("c1", 80.0))
            .node(h.set_fan("hot", 100))
            .edge(WorkflowEdge::new("e1", "t1", "c1"))
            .edge(WorkflowEdge::new("e2", "c1", "hot").with_branch(Branch::True))
            .build()
            .unwrap();
        let wf = h.load(wf);

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert!(h.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn should_reject_cycle_at_execution_start() {
        let h = harness(ScriptedAdapter::new("acme"));
        let wf = Workflow::builder()
            .name("loop")
            .node(manual("t1"))
            .node(h.set_fan("a1", 50))
            .node(delay("d1", 1))
            .edge(WorkflowEdge::new("e1", "t1", "a1"))
            .edge(WorkflowEdge::new("e2", "a1", "d1"))
            .edge(WorkflowEdge::new("e3", "d1", "a1"))
            .build()
            .unwrap();
        let wf = h.load(wf);

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.reason, Some(OutcomeReason::CycleDetected));
        assert!(h.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn should_fail_with_unknown_trigger_when_fired_node_is_not_a_trigger() {
        let h = harness(ScriptedAdapter::new("acme"));
        let wf = h.load(
            Workflow::builder()
                .name("no trigger")
                .node(h.set_fan("t1", 50))
                .build()
                .unwrap(),
        );

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.reason, Some(OutcomeReason::UnknownTrigger));
    }

    #[tokio::test]
    async fn should_continue_siblings_and_successors_when_action_fails() {
        let h = harness(ScriptedAdapter::new("acme"));
        let wf = Workflow::builder()
            .name("partial failure")
            .node(manual("t1"))
            .node(h.action_on("broken", None, None, 50))
            .node(h.set_fan("after", 30))
            .node(h.set_fan("sibling", 40))
            .edge(WorkflowEdge::new("e1", "t1", "broken"))
            .edge(WorkflowEdge::new("e2", "broken", "after"))
            .edge(WorkflowEdge::new("e3", "t1", "sibling"))
            .build()
            .unwrap();
        let wf = h.load(wf);

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(outcome.actions.len(), 3);
        assert_eq!(
            outcome.errors,
            vec![ExecutionError::ActionFailed {
                node_id: NodeId::from("broken"),
                error: "unresolved_target".to_string(),
            }]
        );
        assert_eq!(h.adapter.calls().len(), 2);
    }

    #[tokio::test]
    async fn should_record_terminal_adapter_failure_on_execution() {
        let h = harness(
            ScriptedAdapter::new("acme").script(vec![Err(AdapterError::AuthFailed("token".into()))]),
        );
        let wf = h.load(
            Workflow::builder()
                .name("auth")
                .node(manual("t1"))
                .node(h.set_fan("a1", 10))
                .edge(WorkflowEdge::new("e1", "t1", "a1"))
                .build()
                .unwrap(),
        );

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.actions[0].attempts, 1);
        assert!(matches!(
            &outcome.errors[0],
            ExecutionError::ActionFailed { error, .. } if error == "auth_failed"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_delay_only_its_own_path() {
        let h = harness(ScriptedAdapter::new("acme"));
        let wf = h.load(
            Workflow::builder()
                .name("staggered")
                .node(manual("t1"))
                .node(delay("wait", 60))
                .node(h.set_fan("late", 70))
                .node(h.set_fan("early", 10))
                .edge(WorkflowEdge::new("e1", "t1", "wait"))
                .edge(WorkflowEdge::new("e2", "wait", "late"))
                .edge(WorkflowEdge::new("e3", "t1", "early"))
                .build()
                .unwrap(),
        );

        let started = tokio::time::Instant::now();
        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(
            h.adapter.commands(),
            vec![
                DeviceCommand::SetLevel { level: 10 },
                DeviceCommand::SetLevel { level: 70 }
            ]
        );
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn should_interrupt_delay_on_shutdown() {
        let h = harness(ScriptedAdapter::new("acme"));
        let wf = h.load(
            Workflow::builder()
                .name("interrupted")
                .node(manual("t1"))
                .node(delay("wait", 3600))
                .node(h.set_fan("never", 70))
                .edge(WorkflowEdge::new("e1", "t1", "wait"))
                .edge(WorkflowEdge::new("e2", "wait", "never"))
                .build()
                .unwrap(),
        );
        h.shutdown.cancel();

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.reason, Some(OutcomeReason::Interrupted));
        assert_eq!(
            outcome.errors,
            vec![ExecutionError::DelayInterrupted {
                node_id: NodeId::from("wait"),
            }]
        );
        assert!(h.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn should_run_join_node_once_per_incoming_path() {
        let h = harness(ScriptedAdapter::new("acme"));
        let wf = h.load(
            Workflow::builder()
                .name("diamond")
                .node(manual("t1"))
                .node(h.set_fan("left", 10))
                .node(h.set_fan("right", 20))
                .node(h.set_fan("join", 30))
                .edge(WorkflowEdge::new("e1", "t1", "left"))
                .edge(WorkflowEdge::new("e2", "t1", "right"))
                .edge(WorkflowEdge::new("e3", "left", "join"))
                .edge(WorkflowEdge::new("e4", "right", "join"))
                .build()
                .unwrap(),
        );

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(outcome.actions_for(&NodeId::from("join")).count(), 2);
    }

    #[tokio::test]
    async fn should_skip_when_workflow_not_registered() {
        let h = harness(ScriptedAdapter::new("acme"));
        let wf = Arc::new(branching_workflow(&h));

        let outcome = h.fire(&wf).await;

        assert_eq!(outcome.status, ExecutionStatus::Skipped);
        assert_eq!(outcome.reason, Some(OutcomeReason::WorkflowInactive));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_never_run_same_workflow_concurrently() {
        let h = harness(ScriptedAdapter::new("acme").latency(Duration::from_millis(20)));
        let wf = h.load(
            Workflow::builder()
                .name("single flight")
                .node(manual("t1"))
                .node(h.set_fan("a1", 50))
                .edge(WorkflowEdge::new("e1", "t1", "a1"))
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let executor = Arc::clone(&h.executor);
                let wf = Arc::clone(&wf);
                tokio::spawn(async move {
                    let fire = FireEvent::new(wf.id, NodeId::from("t1"), now());
                    executor.execute(wf, fire).await
                })
            })
            .collect();

        let mut completed = 0;
        let mut skipped = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            match outcome.status {
                ExecutionStatus::Completed => completed += 1,
                ExecutionStatus::Skipped => {
                    assert_eq!(outcome.errors, vec![ExecutionError::AlreadyRunning]);
                    skipped += 1;
                }
                other => panic!("unexpected status {other}"),
            }
        }

        assert!(completed >= 1);
        assert_eq!(completed + skipped, 32);
        assert_eq!(h.adapter.max_in_flight(), 1);
    }
}
