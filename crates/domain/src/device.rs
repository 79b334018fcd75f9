//! Devices: controllers, their ports, and the commands they accept.
//!
//! A controller is one physical box of a given brand exposing numbered
//! ports; each port drives one device (fan, light, heater, …).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ControllerId;

/// Kind of device plugged into a controller port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Fan,
    Light,
    Heater,
    Humidifier,
    Dehumidifier,
    Outlet,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Fan => "fan",
            Self::Light => "light",
            Self::Heater => "heater",
            Self::Humidifier => "humidifier",
            Self::Dehumidifier => "dehumidifier",
            Self::Outlet => "outlet",
        })
    }
}

/// Live state of one controller port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub port: u8,
    pub device_type: DeviceType,
    pub name: String,
    pub is_on: bool,
    /// Current output level, `0..=100`.
    pub level: u8,
    pub supports_dimming: bool,
    pub min_level: u8,
    pub max_level: u8,
}

impl DeviceState {
    /// Clamp a requested level to what the hardware accepts.
    #[must_use]
    pub fn clamp_level(&self, requested: u8) -> u8 {
        if requested == 0 {
            return 0;
        }
        requested.clamp(self.min_level, self.max_level)
    }
}

/// Opaque brand-specific credentials (host, token, serial, …).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub BTreeMap<String, String>);

impl Credentials {
    /// Look up one credential field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

/// A controller, the brand used to talk to it, and its ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    pub id: ControllerId,
    /// Adapter registry key, e.g. `"virtual"`.
    pub brand: String,
    pub name: String,
    #[serde(default)]
    pub credentials: Credentials,
    pub devices: Vec<DeviceState>,
}

impl ControllerState {
    /// Device on the given port, if any.
    #[must_use]
    pub fn device(&self, port: u8) -> Option<&DeviceState> {
        self.devices.iter().find(|d| d.port == port)
    }

    /// First device of the given type, lowest port first.
    #[must_use]
    pub fn first_of_type(&self, device_type: DeviceType) -> Option<&DeviceState> {
        self.devices
            .iter()
            .filter(|d| d.device_type == device_type)
            .min_by_key(|d| d.port)
    }
}

/// Command sent to one port through an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceCommand {
    TurnOn,
    TurnOff,
    SetLevel { level: u8 },
}

impl DeviceCommand {
    /// Requested level, with on/off mapped to the 100/0 boundaries.
    #[must_use]
    pub fn requested_level(self) -> u8 {
        match self {
            Self::TurnOn => 100,
            Self::TurnOff => 0,
            Self::SetLevel { level } => level,
        }
    }
}

impl std::fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TurnOn => f.write_str("turn_on"),
            Self::TurnOff => f.write_str("turn_off"),
            Self::SetLevel { level } => write!(f, "set_level({level})"),
        }
    }
}

/// Result of a successful adapter command.
///
/// `actual_value` may differ from the requested level when the hardware
/// clamps; that is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub actual_value: Option<u8>,
    pub previous_value: Option<u8>,
}

/// Result of a successful adapter connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    pub controller_id: ControllerId,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(port: u8) -> DeviceState {
        DeviceState {
            port,
            device_type: DeviceType::Light,
            name: format!("Light {port}"),
            is_on: false,
            level: 0,
            supports_dimming: true,
            min_level: 10,
            max_level: 90,
        }
    }

    #[test]
    fn should_clamp_requested_level_to_hardware_range() {
        let device = light(1);
        assert_eq!(device.clamp_level(100), 90);
        assert_eq!(device.clamp_level(5), 10);
        assert_eq!(device.clamp_level(50), 50);
    }

    #[test]
    fn should_keep_zero_as_off_when_clamping() {
        assert_eq!(light(1).clamp_level(0), 0);
    }

    #[test]
    fn should_find_lowest_port_of_type() {
        let controller = ControllerState {
            id: ControllerId::new(),
            brand: "virtual".to_string(),
            name: "Tent".to_string(),
            credentials: Credentials::default(),
            devices: vec![light(3), light(2)],
        };
        assert_eq!(controller.first_of_type(DeviceType::Light).unwrap().port, 2);
        assert!(controller.first_of_type(DeviceType::Fan).is_none());
        assert!(controller.device(3).is_some());
    }

    #[test]
    fn should_map_on_off_to_boundary_levels() {
        assert_eq!(DeviceCommand::TurnOn.requested_level(), 100);
        assert_eq!(DeviceCommand::TurnOff.requested_level(), 0);
        assert_eq!(DeviceCommand::SetLevel { level: 42 }.requested_level(), 42);
    }

    #[test]
    fn should_deserialize_credentials_from_flat_map() {
        let creds: Credentials =
            serde_json::from_value(serde_json::json!({"token": "s3cret"})).unwrap();
        assert_eq!(creds.get("token"), Some("s3cret"));
    }
}
