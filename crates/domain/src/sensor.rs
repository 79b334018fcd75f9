//! Sensor readings pushed by the ingestion feed.

use serde::{Deserialize, Serialize};

use crate::id::ControllerId;
use crate::time::Timestamp;

/// Physical quantity measured by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Humidity,
    Vpd,
    Co2,
    Light,
    SoilMoisture,
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Vpd => "vpd",
            Self::Co2 => "co2",
            Self::Light => "light",
            Self::SoilMoisture => "soil_moisture",
        })
    }
}

/// Cache key: one sensor (or sensor port) on one controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorKey {
    pub controller_id: ControllerId,
    /// Port number or vendor sensor id, as reported by the controller.
    pub sensor_id: String,
}

/// One measurement as delivered by the ingestion feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub controller_id: ControllerId,
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub timestamp: Timestamp,
}

impl SensorReading {
    /// The cache key for this reading.
    #[must_use]
    pub fn key(&self) -> SensorKey {
        SensorKey {
            controller_id: self.controller_id,
            sensor_id: self.sensor_id.clone(),
        }
    }

    /// Whether the reading is older than `window` at instant `now`.
    #[must_use]
    pub fn is_stale_at(&self, now: Timestamp, window: chrono::Duration) -> bool {
        now - self.timestamp > window
    }
}
