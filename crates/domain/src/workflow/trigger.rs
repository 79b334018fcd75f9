//! Trigger: the graph entry point that starts an execution.

use serde::{Deserialize, Serialize};

use crate::condition::ComparisonOperator;
use crate::id::ControllerId;
use crate::sensor::SensorType;

/// Payload of a trigger node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger_type", rename_all = "snake_case")]
pub enum TriggerData {
    /// Fires every `interval_secs` from workflow activation.
    Timer { interval_secs: u64 },
    /// Fires on each transition of a sensor comparison from unmet to met.
    Sensor {
        sensor_type: SensorType,
        operator: ComparisonOperator,
        threshold: f64,
        /// Restrict to one controller; any controller when absent.
        #[serde(default)]
        controller_id: Option<ControllerId>,
    },
    /// Fires at instants computed from a 5-field cron expression.
    Schedule {
        cron: String,
        /// IANA timezone name; UTC when absent.
        #[serde(default)]
        timezone: Option<String>,
    },
    /// Fires only on explicit external invocation.
    Manual,
}

impl TriggerData {
    /// Short variant name, used in logs.
    #[must_use]
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Timer { .. } => "timer",
            Self::Sensor { .. } => "sensor",
            Self::Schedule { .. } => "schedule",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timer { interval_secs } => write!(f, "timer({interval_secs}s)"),
            Self::Sensor {
                sensor_type,
                operator,
                threshold,
                ..
            } => write!(f, "sensor({sensor_type} {operator} {threshold})"),
            Self::Schedule { cron, .. } => write!(f, "schedule({cron})"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_trigger_variants() {
        assert_eq!(
            TriggerData::Timer { interval_secs: 60 }.to_string(),
            "timer(60s)"
        );
        let sensor = TriggerData::Sensor {
            sensor_type: SensorType::Temperature,
            operator: ComparisonOperator::GreaterThan,
            threshold: 80.0,
            controller_id: None,
        };
        assert_eq!(sensor.to_string(), "sensor(temperature > 80)");
        assert_eq!(TriggerData::Manual.to_string(), "manual");
    }

    #[test]
    fn should_deserialize_schedule_without_timezone() {
        let json = serde_json::json!({"trigger_type": "schedule", "cron": "0 6 * * *"});
        let parsed: TriggerData = serde_json::from_value(json).unwrap();
        assert!(matches!(parsed, TriggerData::Schedule { timezone: None, .. }));
    }

    #[test]
    fn should_deserialize_sensor_trigger_from_tagged_json() {
        let json = serde_json::json!({
            "trigger_type": "sensor",
            "sensor_type": "humidity",
            "operator": "<",
            "threshold": 45.0
        });
        let parsed: TriggerData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.variant(), "sensor");
    }
}
