//! Simulated sensor feed: slow sine waves around a baseline.

use std::f64::consts::TAU;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use roomhub_domain::device::ControllerState;
use roomhub_domain::id::ControllerId;
use roomhub_domain::sensor::{SensorReading, SensorType};
use roomhub_domain::time::{Timestamp, now};

use crate::BRAND;

/// One simulated probe.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedSensor {
    pub controller_id: ControllerId,
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub baseline: f64,
    pub amplitude: f64,
    /// Ticks per full oscillation.
    pub period_ticks: u32,
    pub unit: Option<String>,
}

impl SimulatedSensor {
    #[must_use]
    pub fn temperature(controller_id: ControllerId) -> Self {
        Self {
            controller_id,
            sensor_id: "virtual-temperature".to_string(),
            sensor_type: SensorType::Temperature,
            baseline: 76.0,
            amplitude: 8.0,
            period_ticks: 240,
            unit: Some("°F".to_string()),
        }
    }

    #[must_use]
    pub fn humidity(controller_id: ControllerId) -> Self {
        Self {
            controller_id,
            sensor_id: "virtual-humidity".to_string(),
            sensor_type: SensorType::Humidity,
            baseline: 55.0,
            amplitude: 10.0,
            period_ticks: 360,
            unit: Some("%".to_string()),
        }
    }

    /// Reading for the `tick`-th sample.
    #[must_use]
    pub fn reading_at(&self, tick: u32, timestamp: Timestamp) -> SensorReading {
        let period = self.period_ticks.max(1);
        let phase = f64::from(tick % period) / f64::from(period);
        let value = self.baseline + self.amplitude * (TAU * phase).sin();
        SensorReading {
            controller_id: self.controller_id,
            sensor_id: self.sensor_id.clone(),
            sensor_type: self.sensor_type,
            value: (value * 10.0).round() / 10.0,
            unit: self.unit.clone(),
            timestamp,
        }
    }
}

/// Periodically pushes simulated readings into the ingestion channel.
#[derive(Debug, Clone)]
pub struct SensorFeed {
    interval: Duration,
    sensors: Vec<SimulatedSensor>,
}

impl SensorFeed {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sensors: Vec::new(),
        }
    }

    /// Temperature and humidity probes for every virtual-brand controller.
    #[must_use]
    pub fn for_controllers<'a>(
        interval: Duration,
        states: impl IntoIterator<Item = &'a ControllerState>,
    ) -> Self {
        states
            .into_iter()
            .filter(|state| state.brand == BRAND)
            .fold(Self::new(interval), |feed, state| {
                feed.with_sensor(SimulatedSensor::temperature(state.id))
                    .with_sensor(SimulatedSensor::humidity(state.id))
            })
    }

    #[must_use]
    pub fn with_sensor(mut self, sensor: SimulatedSensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    #[must_use]
    pub fn sensors(&self) -> &[SimulatedSensor] {
        &self.sensors
    }

    /// Emit one reading per sensor every interval until `shutdown` is
    /// cancelled or the receiver is dropped.
    pub async fn run(self, readings: mpsc::Sender<SensorReading>, shutdown: CancellationToken) {
        if self.sensors.is_empty() {
            debug!("no simulated sensors");
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u32 = 0;

        'feed: loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let at = now();
                    for sensor in &self.sensors {
                        if readings.send(sensor.reading_at(tick, at)).await.is_err() {
                            debug!("ingestion channel closed");
                            break 'feed;
                        }
                    }
                    tick = tick.wrapping_add(1);
                }
            }
        }
        info!(sensors = self.sensors.len(), "simulated sensor feed stopped");
    }
}
