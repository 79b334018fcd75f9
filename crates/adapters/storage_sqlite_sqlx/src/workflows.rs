//! `workflows` table.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};
use tracing::warn;

use roomhub_domain::id::{UserId, WorkflowId};
use roomhub_domain::time::Timestamp;
use roomhub_domain::workflow::{Workflow, WorkflowEdge, WorkflowNode};

use crate::error::{StorageError, decode};

pub(crate) struct Wrapper(pub(crate) Workflow);

pub(crate) fn parse_timestamp(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.to_utc())
        .map_err(decode)
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let owner_id: String = row.try_get("owner_id")?;
        let nodes_json: String = row.try_get("nodes")?;
        let edges_json: String = row.try_get("edges")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        let nodes: Vec<WorkflowNode> = serde_json::from_str(&nodes_json).map_err(decode)?;
        let edges: Vec<WorkflowEdge> = serde_json::from_str(&edges_json).map_err(decode)?;

        Ok(Self(Workflow {
            id: WorkflowId::from_str(&id).map_err(decode)?,
            owner_id: UserId::from_str(&owner_id).map_err(decode)?,
            name: row.try_get("name")?,
            nodes,
            edges,
            is_active: row.try_get("is_active")?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }
}

pub(crate) async fn upsert(pool: &SqlitePool, workflow: &Workflow) -> Result<(), StorageError> {
    let nodes_json = serde_json::to_string(&workflow.nodes)?;
    let edges_json = serde_json::to_string(&workflow.edges)?;

    sqlx::query(
        "INSERT INTO workflows (id, owner_id, name, nodes, edges, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (id) DO UPDATE SET owner_id = excluded.owner_id, name = excluded.name, \
         nodes = excluded.nodes, edges = excluded.edges, is_active = excluded.is_active, \
         updated_at = excluded.updated_at",
    )
    .bind(workflow.id.to_string())
    .bind(workflow.owner_id.to_string())
    .bind(&workflow.name)
    .bind(&nodes_json)
    .bind(&edges_json)
    .bind(workflow.is_active)
    .bind(workflow.created_at.to_rfc3339())
    .bind(workflow.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Rows that fail to decode are logged and skipped so one bad workflow
/// cannot keep the others from loading.
pub(crate) async fn load_active(pool: &SqlitePool) -> Result<Vec<Workflow>, StorageError> {
    let rows = sqlx::query("SELECT * FROM workflows WHERE is_active = 1 ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| match Wrapper::from_row(row) {
            Ok(Wrapper(workflow)) => Some(workflow),
            Err(err) => {
                let id: Option<String> = row.try_get("id").ok();
                warn!(workflow_id = ?id, error = %err, "skipping undecodable workflow");
                None
            }
        })
        .collect())
}

pub(crate) async fn get(pool: &SqlitePool, id: WorkflowId) -> Result<Option<Workflow>, StorageError> {
    let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM workflows WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|w| w.0))
}

/// Flip the active flag, bumping `updated_at` so running dispatchers
/// notice the change. Returns whether the workflow exists.
pub(crate) async fn set_active(
    pool: &SqlitePool,
    id: WorkflowId,
    active: bool,
    at: Timestamp,
) -> Result<bool, StorageError> {
    let result = sqlx::query("UPDATE workflows SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(at.to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
