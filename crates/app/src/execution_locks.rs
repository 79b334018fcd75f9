//! Per-workflow execution exclusivity.
//!
//! One lock per loaded workflow, keyed by id. A lock is created when the
//! workflow is activated and marked inactive when it is deactivated. The
//! slot itself is only dropped once no execution holds the lock, so a
//! reactivation during a run reuses the same mutex. Acquiring is
//! non-blocking: a fire arriving while an execution holds the lock is
//! skipped rather than queued.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use roomhub_domain::execution::OutcomeReason;
use roomhub_domain::id::WorkflowId;

/// Held for the lifetime of one execution; releases the lock on drop.
#[derive(Debug)]
pub struct ExecutionGuard {
    workflow_id: WorkflowId,
    _guard: OwnedMutexGuard<()>,
}

impl ExecutionGuard {
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }
}

#[derive(Debug, Default)]
struct Slot {
    lock: Arc<Mutex<()>>,
    active: bool,
}

impl Slot {
    fn is_held(&self) -> bool {
        Arc::strong_count(&self.lock) > 1
    }
}

/// Keyed mutual-exclusion table.
#[derive(Debug, Default)]
pub struct ExecutionLocks {
    locks: DashMap<WorkflowId, Slot>,
}

impl ExecutionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate the lock of a workflow. Idempotent; an existing mutex is
    /// kept, including one still held by a run from before a deactivation.
    pub fn register(&self, workflow_id: WorkflowId) {
        self.locks.entry(workflow_id).or_default().active = true;
    }

    /// Deactivate the lock of a workflow.
    ///
    /// An execution already holding the lock keeps it until it finishes;
    /// the slot is only removed when nobody holds it.
    pub fn unregister(&self, workflow_id: WorkflowId) {
        let removed = self
            .locks
            .remove_if(&workflow_id, |_, slot| !slot.is_held());
        if removed.is_none()
            && let Some(mut slot) = self.locks.get_mut(&workflow_id)
        {
            slot.active = false;
        }
    }

    #[must_use]
    pub fn is_registered(&self, workflow_id: WorkflowId) -> bool {
        self.locks
            .get(&workflow_id)
            .is_some_and(|slot| slot.active)
    }

    /// Try to start an execution of `workflow_id` without waiting.
    ///
    /// # Errors
    ///
    /// - [`OutcomeReason::WorkflowInactive`] when no lock is registered
    /// - [`OutcomeReason::AlreadyRunning`] when another execution holds it
    pub fn try_acquire(&self, workflow_id: WorkflowId) -> Result<ExecutionGuard, OutcomeReason> {
        let lock = self
            .locks
            .get(&workflow_id)
            .filter(|slot| slot.active)
            .map(|slot| Arc::clone(&slot.lock))
            .ok_or(OutcomeReason::WorkflowInactive)?;
        let guard = lock
            .try_lock_owned()
            .map_err(|_| OutcomeReason::AlreadyRunning)?;
        Ok(ExecutionGuard {
            workflow_id,
            _guard: guard,
        })
    }

    /// Number of active workflows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.iter().filter(|slot| slot.active).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
