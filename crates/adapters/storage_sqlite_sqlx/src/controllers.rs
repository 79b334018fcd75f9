//! `controllers` table.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use roomhub_domain::device::{ControllerState, Credentials, DeviceState};
use roomhub_domain::id::ControllerId;

use crate::error::{StorageError, decode};

struct Wrapper(ControllerState);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let credentials_json: String = row.try_get("credentials")?;
        let devices_json: String = row.try_get("devices")?;

        let credentials: Credentials = serde_json::from_str(&credentials_json).map_err(decode)?;
        let devices: Vec<DeviceState> = serde_json::from_str(&devices_json).map_err(decode)?;

        Ok(Self(ControllerState {
            id: ControllerId::from_str(&id).map_err(decode)?,
            brand: row.try_get("brand")?,
            name: row.try_get("name")?,
            credentials,
            devices,
        }))
    }
}

pub(crate) async fn upsert(pool: &SqlitePool, controller: &ControllerState) -> Result<(), StorageError> {
    let credentials_json = serde_json::to_string(&controller.credentials)?;
    let devices_json = serde_json::to_string(&controller.devices)?;

    sqlx::query(
        "INSERT INTO controllers (id, brand, name, credentials, devices) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (id) DO UPDATE SET brand = excluded.brand, name = excluded.name, \
         credentials = excluded.credentials, devices = excluded.devices",
    )
    .bind(controller.id.to_string())
    .bind(&controller.brand)
    .bind(&controller.name)
    .bind(&credentials_json)
    .bind(&devices_json)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn get(
    pool: &SqlitePool,
    id: ControllerId,
) -> Result<Option<ControllerState>, StorageError> {
    let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM controllers WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|w| w.0))
}

pub(crate) async fn list(pool: &SqlitePool) -> Result<Vec<ControllerState>, StorageError> {
    let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM controllers ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|w| w.0).collect())
}
