//! Action: the device effect performed when a path reaches an action node.

use serde::{Deserialize, Serialize};

use crate::device::{DeviceCommand, DeviceType};
use crate::id::ControllerId;

/// What the action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SetFan,
    SetLight,
    SetHeater,
    SetHumidifier,
    SetDehumidifier,
    TurnOn,
    TurnOff,
}

impl ActionKind {
    /// Device type implied by a `set_*` action; `None` for on/off.
    #[must_use]
    pub fn implied_device_type(self) -> Option<DeviceType> {
        match self {
            Self::SetFan => Some(DeviceType::Fan),
            Self::SetLight => Some(DeviceType::Light),
            Self::SetHeater => Some(DeviceType::Heater),
            Self::SetHumidifier => Some(DeviceType::Humidifier),
            Self::SetDehumidifier => Some(DeviceType::Dehumidifier),
            Self::TurnOn | Self::TurnOff => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::SetFan => "set_fan",
            Self::SetLight => "set_light",
            Self::SetHeater => "set_heater",
            Self::SetHumidifier => "set_humidifier",
            Self::SetDehumidifier => "set_dehumidifier",
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
        })
    }
}

/// Payload of an action node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionData {
    pub action: ActionKind,
    #[serde(default)]
    pub controller_id: Option<ControllerId>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub port: Option<u8>,
    /// Dimmer-style level, `0..=100`.
    #[serde(default)]
    pub level: Option<u8>,
}

impl ActionData {
    /// The device type this action targets, explicit or implied.
    #[must_use]
    pub fn target_device_type(&self) -> Option<DeviceType> {
        self.device_type.or_else(|| self.action.implied_device_type())
    }

    /// The command to send.
    ///
    /// A `set_*` action without a level drives the device to full output.
    #[must_use]
    pub fn command(&self) -> DeviceCommand {
        match self.action {
            ActionKind::TurnOn => DeviceCommand::TurnOn,
            ActionKind::TurnOff => DeviceCommand::TurnOff,
            _ => DeviceCommand::SetLevel {
                level: self.level.unwrap_or(100).min(100),
            },
        }
    }
}

impl std::fmt::Display for ActionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.level {
            Some(level) => write!(f, "{}({level})", self.action),
            None => write!(f, "{}", self.action),
        }
    }
}
