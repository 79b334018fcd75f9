//! Latest sensor reading per `(controller, sensor)` with staleness tracking.
//!
//! Entries are locked per key by the underlying [`DashMap`]; there is no
//! cache-wide lock.

use chrono::Duration;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

use roomhub_domain::id::ControllerId;
use roomhub_domain::sensor::{SensorKey, SensorReading, SensorType};
use roomhub_domain::time::{Timestamp, now};

/// A cached reading together with its staleness at query time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedReading {
    #[serde(flatten)]
    pub reading: SensorReading,
    pub stale: bool,
}

/// Concurrent cache of the most recent reading per sensor.
#[derive(Debug)]
pub struct SensorCache {
    readings: DashMap<SensorKey, SensorReading>,
    staleness_window: Duration,
}

impl SensorCache {
    #[must_use]
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            readings: DashMap::new(),
            staleness_window,
        }
    }

    #[must_use]
    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Store a reading unless a newer one for the same key is already held.
    ///
    /// Returns `true` when the reading became the cached value.
    pub fn update(&self, reading: SensorReading) -> bool {
        self.update_at(reading, now())
    }

    /// [`Self::update`] with an explicit clock. Timestamps later than `now`
    /// are clamped to `now`, so a skewed sender cannot shadow the readings
    /// that follow.
    pub fn update_at(&self, mut reading: SensorReading, now: Timestamp) -> bool {
        reading.timestamp = reading.timestamp.min(now);
        match self.readings.entry(reading.key()) {
            Entry::Occupied(mut held) => {
                if held.get().timestamp > reading.timestamp {
                    return false;
                }
                held.insert(reading);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(reading);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &SensorKey) -> Option<SensorReading> {
        self.readings.get(key).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn is_stale(&self, reading: &SensorReading, now: Timestamp) -> bool {
        reading.is_stale_at(now, self.staleness_window)
    }

    /// Freshest reading of `sensor_type`, restricted to one controller when
    /// given. Stale readings are returned too.
    #[must_use]
    pub fn latest(
        &self,
        controller_id: Option<ControllerId>,
        sensor_type: SensorType,
    ) -> Option<SensorReading> {
        self.readings
            .iter()
            .filter(|entry| entry.sensor_type == sensor_type)
            .filter(|entry| controller_id.is_none_or(|id| entry.controller_id == id))
            .max_by_key(|entry| entry.timestamp)
            .map(|entry| entry.value().clone())
    }

    /// Every cached reading with its staleness at `now`, ordered by key.
    #[must_use]
    pub fn snapshot(&self, now: Timestamp) -> Vec<CachedReading> {
        let mut all: Vec<CachedReading> = self
            .readings
            .iter()
            .map(|entry| CachedReading {
                stale: self.is_stale(entry.value(), now),
                reading: entry.value().clone(),
            })
            .collect();
        all.sort_by(|a, b| a.reading.key().cmp(&b.reading.key()));
        all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
