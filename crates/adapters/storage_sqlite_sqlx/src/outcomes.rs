//! `execution_outcomes` table. The full outcome is kept as JSON; the other
//! columns exist for filtering.

use sqlx::SqlitePool;

use roomhub_domain::execution::ExecutionOutcome;
use roomhub_domain::id::WorkflowId;

use crate::error::StorageError;

pub(crate) async fn insert(pool: &SqlitePool, outcome: &ExecutionOutcome) -> Result<(), StorageError> {
    let outcome_json = serde_json::to_string(outcome)?;
    let reason = outcome
        .reason
        .map(serde_json::to_value)
        .transpose()?
        .and_then(|value| value.as_str().map(str::to_string));

    sqlx::query(
        "INSERT INTO execution_outcomes (id, workflow_id, trigger_node_id, status, reason, fired_at, finished_at, outcome) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(outcome.execution_id.to_string())
    .bind(outcome.workflow_id.to_string())
    .bind(outcome.trigger_node_id.as_str())
    .bind(outcome.status.to_string())
    .bind(reason)
    .bind(outcome.fired_at.to_rfc3339())
    .bind(outcome.finished_at.to_rfc3339())
    .bind(&outcome_json)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent outcomes of one workflow, newest first.
pub(crate) async fn recent(
    pool: &SqlitePool,
    workflow_id: WorkflowId,
    limit: u32,
) -> Result<Vec<ExecutionOutcome>, StorageError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT outcome FROM execution_outcomes WHERE workflow_id = ? ORDER BY finished_at DESC LIMIT ?",
    )
    .bind(workflow_id.to_string())
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(json,)| serde_json::from_str(&json).map_err(StorageError::from))
        .collect()
}
