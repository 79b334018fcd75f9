//! One simulated controller: ports, connection flag and auth token.

use std::collections::BTreeMap;

use roomhub_domain::device::{CommandOutcome, ControllerState, Credentials, DeviceCommand, DeviceState};
use roomhub_domain::error::AdapterError;

/// Credential key checked on connect.
pub const TOKEN_KEY: &str = "token";

#[derive(Debug, Clone)]
pub(crate) struct VirtualController {
    token: Option<String>,
    ports: BTreeMap<u8, DeviceState>,
    connected: bool,
    reachable: bool,
}

impl VirtualController {
    /// A reachable, disconnected controller mirroring `state`. The token in
    /// its stored credentials, if any, is required on connect.
    pub(crate) fn from_state(state: &ControllerState) -> Self {
        Self {
            token: state.credentials.get(TOKEN_KEY).map(str::to_string),
            ports: state
                .devices
                .iter()
                .map(|device| (device.port, device.clone()))
                .collect(),
            connected: false,
            reachable: true,
        }
    }

    pub(crate) fn connect(&mut self, credentials: &Credentials) -> Result<(), AdapterError> {
        self.ensure_reachable()?;
        if let Some(expected) = &self.token
            && credentials.get(TOKEN_KEY) != Some(expected.as_str())
        {
            return Err(AdapterError::AuthFailed("token rejected".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    pub(crate) fn disconnect(&mut self) {
        self.connected = false;
    }

    pub(crate) fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
        if !reachable {
            self.connected = false;
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn devices(&self) -> Result<Vec<DeviceState>, AdapterError> {
        self.ensure_session()?;
        Ok(self.ports.values().cloned().collect())
    }

    pub(crate) fn device(&self, port: u8) -> Option<&DeviceState> {
        self.ports.get(&port)
    }

    /// Apply `command` to `port`, clamping to the port's accepted range.
    pub(crate) fn apply(
        &mut self,
        port: u8,
        command: DeviceCommand,
    ) -> Result<CommandOutcome, AdapterError> {
        self.ensure_session()?;
        let device = self
            .ports
            .get_mut(&port)
            .ok_or(AdapterError::InvalidPort(port))?;

        let requested = command.requested_level();
        if !device.supports_dimming && !matches!(requested, 0 | 100) {
            return Err(AdapterError::UnsupportedCapability(format!(
                "port {port} is on/off only"
            )));
        }

        let previous = device.level;
        let actual = if device.supports_dimming {
            device.clamp_level(requested)
        } else {
            requested
        };
        device.level = actual;
        device.is_on = actual > 0;

        Ok(CommandOutcome {
            actual_value: Some(actual),
            previous_value: Some(previous),
        })
    }

    fn ensure_reachable(&self) -> Result<(), AdapterError> {
        if self.reachable {
            Ok(())
        } else {
            Err(AdapterError::Unreachable("simulated outage".to_string()))
        }
    }

    fn ensure_session(&self) -> Result<(), AdapterError> {
        self.ensure_reachable()?;
        if self.connected {
            Ok(())
        } else {
            Err(AdapterError::Unreachable("not connected".to_string()))
        }
    }
}
