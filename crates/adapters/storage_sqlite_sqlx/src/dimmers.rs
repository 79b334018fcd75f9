//! `dimmer_configs` table.

use std::str::FromStr;

use chrono::NaiveTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};
use tracing::warn;

use roomhub_domain::dimmer::{CurveShape, DimmerConfig};
use roomhub_domain::id::{ControllerId, DimmerConfigId, WorkflowId};

use crate::error::{StorageError, decode};

const TIME_FORMAT: &str = "%H:%M:%S";

struct Wrapper(DimmerConfig);

fn parse_curve(value: String) -> Result<CurveShape, sqlx::Error> {
    serde_json::from_value(serde_json::Value::String(value)).map_err(decode)
}

fn parse_time(value: &str) -> Result<NaiveTime, sqlx::Error> {
    NaiveTime::from_str(value).map_err(decode)
}

fn narrow<T: TryFrom<i64>>(value: i64) -> Result<T, sqlx::Error>
where
    T::Error: std::error::Error + Send + Sync + 'static,
{
    T::try_from(value).map_err(decode)
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let workflow_id: String = row.try_get("workflow_id")?;
        let controller_id: String = row.try_get("controller_id")?;
        let sunrise_time: String = row.try_get("sunrise_time")?;
        let sunset_time: String = row.try_get("sunset_time")?;

        Ok(Self(DimmerConfig {
            id: DimmerConfigId::from_str(&id).map_err(decode)?,
            workflow_id: WorkflowId::from_str(&workflow_id).map_err(decode)?,
            controller_id: ControllerId::from_str(&controller_id).map_err(decode)?,
            port: narrow(row.try_get("port")?)?,
            sunrise_time: parse_time(&sunrise_time)?,
            sunrise_duration_mins: narrow(row.try_get("sunrise_duration_mins")?)?,
            sunrise_curve: parse_curve(row.try_get("sunrise_curve")?)?,
            sunset_time: parse_time(&sunset_time)?,
            sunset_duration_mins: narrow(row.try_get("sunset_duration_mins")?)?,
            sunset_curve: parse_curve(row.try_get("sunset_curve")?)?,
            target_intensity: narrow(row.try_get("target_intensity")?)?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

pub(crate) async fn upsert(pool: &SqlitePool, config: &DimmerConfig) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO dimmer_configs (id, workflow_id, controller_id, port, sunrise_time, \
         sunrise_duration_mins, sunrise_curve, sunset_time, sunset_duration_mins, sunset_curve, \
         target_intensity, is_active) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (id) DO UPDATE SET workflow_id = excluded.workflow_id, \
         controller_id = excluded.controller_id, port = excluded.port, \
         sunrise_time = excluded.sunrise_time, sunrise_duration_mins = excluded.sunrise_duration_mins, \
         sunrise_curve = excluded.sunrise_curve, sunset_time = excluded.sunset_time, \
         sunset_duration_mins = excluded.sunset_duration_mins, sunset_curve = excluded.sunset_curve, \
         target_intensity = excluded.target_intensity, is_active = excluded.is_active",
    )
    .bind(config.id.to_string())
    .bind(config.workflow_id.to_string())
    .bind(config.controller_id.to_string())
    .bind(i64::from(config.port))
    .bind(config.sunrise_time.format(TIME_FORMAT).to_string())
    .bind(i64::from(config.sunrise_duration_mins))
    .bind(config.sunrise_curve.to_string())
    .bind(config.sunset_time.format(TIME_FORMAT).to_string())
    .bind(i64::from(config.sunset_duration_mins))
    .bind(config.sunset_curve.to_string())
    .bind(i64::from(config.target_intensity))
    .bind(config.is_active)
    .execute(pool)
    .await?;
    Ok(())
}

/// Active configs whose workflow is active too. Undecodable rows are
/// logged and skipped.
pub(crate) async fn load_active(pool: &SqlitePool) -> Result<Vec<DimmerConfig>, StorageError> {
    let rows = sqlx::query(
        "SELECT d.* FROM dimmer_configs d \
         JOIN workflows w ON w.id = d.workflow_id \
         WHERE d.is_active = 1 AND w.is_active = 1 \
         ORDER BY d.controller_id, d.port",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .filter_map(|row| match Wrapper::from_row(row) {
            Ok(Wrapper(config)) => Some(config),
            Err(err) => {
                let id: Option<String> = row.try_get("id").ok();
                warn!(dimmer_config_id = ?id, error = %err, "skipping undecodable dimmer config");
                None
            }
        })
        .collect())
}
