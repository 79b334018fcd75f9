//! # roomhub-adapter-virtual
//!
//! Simulated controller brand for testing and demonstration.
//!
//! ## Behaviour
//!
//! | Aspect | Simulation |
//! |--------|------------|
//! | Auth | A `token` credential stored on the controller must be presented on connect |
//! | Ports | Seeded from the controller's stored devices; levels clamp to each port's min/max |
//! | On/off ports | Accept only 0 and 100; other levels are `UnsupportedCapability` |
//! | Outages | [`VirtualControllerAdapter::set_reachable`] makes a controller `Unreachable` |
//! | Sensors | [`SensorFeed`] emits periodic temperature/humidity readings |
//!
//! ## Dependency rule
//!
//! Depends on `roomhub-app` (port traits) and `roomhub-domain` only.

mod controller;
mod feed;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use roomhub_app::ports::DeviceAdapter;
use roomhub_domain::device::{
    CommandOutcome, ConnectResult, ControllerState, Credentials, DeviceCommand, DeviceState,
};
use roomhub_domain::error::AdapterError;
use roomhub_domain::id::ControllerId;

pub use controller::TOKEN_KEY;
pub use feed::{SensorFeed, SimulatedSensor};

use controller::VirtualController;

/// Registry key of the virtual brand.
pub const BRAND: &str = "virtual";

/// Device adapter backed by in-memory controllers.
#[derive(Default)]
pub struct VirtualControllerAdapter {
    controllers: Mutex<HashMap<ControllerId, VirtualController>>,
}

impl VirtualControllerAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter pre-seeded with the virtual-brand controllers among `states`.
    #[must_use]
    pub fn seeded<'a>(states: impl IntoIterator<Item = &'a ControllerState>) -> Self {
        let adapter = Self::new();
        for state in states {
            adapter.seed(state);
        }
        adapter
    }

    /// Simulate `state`. Controllers of other brands are ignored; seeding an
    /// existing controller resets it.
    pub fn seed(&self, state: &ControllerState) {
        if state.brand != BRAND {
            return;
        }
        self.lock()
            .insert(state.id, VirtualController::from_state(state));
        debug!(controller_id = %state.id, name = %state.name, "virtual controller seeded");
    }

    /// Simulate an outage (`false`) or its end (`true`).
    pub fn set_reachable(&self, controller_id: ControllerId, reachable: bool) {
        if let Some(controller) = self.lock().get_mut(&controller_id) {
            controller.set_reachable(reachable);
        }
    }

    /// Snapshot of one port, regardless of the session.
    #[must_use]
    pub fn device(&self, controller_id: ControllerId, port: u8) -> Option<DeviceState> {
        self.lock()
            .get(&controller_id)
            .and_then(|controller| controller.device(port).cloned())
    }

    #[must_use]
    pub fn is_connected(&self, controller_id: ControllerId) -> bool {
        self.lock()
            .get(&controller_id)
            .is_some_and(VirtualController::is_connected)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ControllerId, VirtualController>> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with_controller<T>(
        &self,
        controller_id: ControllerId,
        f: impl FnOnce(&mut VirtualController) -> Result<T, AdapterError>,
    ) -> Result<T, AdapterError> {
        let mut controllers = self.lock();
        let controller = controllers
            .get_mut(&controller_id)
            .ok_or_else(|| AdapterError::Unreachable(format!("no virtual controller {controller_id}")))?;
        f(controller)
    }
}

#[async_trait]
impl DeviceAdapter for VirtualControllerAdapter {
    fn brand(&self) -> &str {
        BRAND
    }

    async fn connect(
        &self,
        controller_id: ControllerId,
        credentials: &Credentials,
    ) -> Result<ConnectResult, AdapterError> {
        self.with_controller(controller_id, |controller| controller.connect(credentials))?;
        Ok(ConnectResult {
            controller_id,
            metadata: [("simulated".to_string(), "true".to_string())].into(),
        })
    }

    async fn disconnect(&self, controller_id: ControllerId) -> Result<(), AdapterError> {
        self.with_controller(controller_id, |controller| {
            controller.disconnect();
            Ok(())
        })
    }

    async fn capabilities(
        &self,
        controller_id: ControllerId,
    ) -> Result<Vec<DeviceState>, AdapterError> {
        self.with_controller(controller_id, |controller| controller.devices())
    }

    async fn apply_command(
        &self,
        controller_id: ControllerId,
        port: u8,
        command: DeviceCommand,
    ) -> Result<CommandOutcome, AdapterError> {
        let outcome =
            self.with_controller(controller_id, |controller| controller.apply(port, command))?;
        debug!(%controller_id, port, %command, actual = ?outcome.actual_value, "virtual command applied");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomhub_domain::device::DeviceType;

    fn controller(brand: &str, token: Option<&str>) -> ControllerState {
        let credentials = token.map_or_else(Credentials::default, |t| {
            Credentials::default().with(TOKEN_KEY, t)
        });
        ControllerState {
            id: ControllerId::new(),
            brand: brand.to_string(),
            name: "Flower tent".to_string(),
            credentials,
            devices: vec![DeviceState {
                port: 1,
                device_type: DeviceType::Fan,
                name: "Inline fan".to_string(),
                is_on: false,
                level: 0,
                supports_dimming: true,
                min_level: 25,
                max_level: 100,
            }],
        }
    }

    #[test]
    fn should_report_virtual_brand() {
        assert_eq!(VirtualControllerAdapter::new().brand(), "virtual");
    }

    #[test]
    fn should_only_seed_virtual_brand_controllers() {
        let ours = controller(BRAND, None);
        let theirs = controller("acme", None);
        let adapter = VirtualControllerAdapter::seeded([&ours, &theirs]);

        assert!(adapter.device(ours.id, 1).is_some());
        assert!(adapter.device(theirs.id, 1).is_none());
    }

    #[tokio::test]
    async fn should_apply_clamped_command_after_connect() {
        let state = controller(BRAND, Some("abc"));
        let adapter = VirtualControllerAdapter::seeded([&state]);

        adapter.connect(state.id, &state.credentials).await.unwrap();
        let outcome = adapter
            .apply_command(state.id, 1, DeviceCommand::SetLevel { level: 10 })
            .await
            .unwrap();

        assert_eq!(outcome.actual_value, Some(25));
        assert_eq!(outcome.previous_value, Some(0));
        assert!(adapter.device(state.id, 1).unwrap().is_on);
    }

    #[tokio::test]
    async fn should_fail_auth_without_token() {
        let state = controller(BRAND, Some("abc"));
        let adapter = VirtualControllerAdapter::seeded([&state]);

        let result = adapter.connect(state.id, &Credentials::default()).await;
        assert!(matches!(result, Err(AdapterError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn should_be_unreachable_for_unknown_controller() {
        let adapter = VirtualControllerAdapter::new();
        let result = adapter.connect(ControllerId::new(), &Credentials::default()).await;
        assert!(matches!(result, Err(AdapterError::Unreachable(_))));
    }

    #[tokio::test]
    async fn should_need_reconnect_after_outage() {
        let state = controller(BRAND, None);
        let adapter = VirtualControllerAdapter::seeded([&state]);
        adapter.connect(state.id, &state.credentials).await.unwrap();

        adapter.set_reachable(state.id, false);
        let during = adapter.apply_command(state.id, 1, DeviceCommand::TurnOn).await;
        assert!(matches!(during, Err(AdapterError::Unreachable(_))));

        adapter.set_reachable(state.id, true);
        assert!(!adapter.is_connected(state.id));
        adapter.connect(state.id, &state.credentials).await.unwrap();
        assert!(adapter.apply_command(state.id, 1, DeviceCommand::TurnOn).await.is_ok());
    }

    #[tokio::test]
    async fn should_list_ports_as_capabilities() {
        let state = controller(BRAND, None);
        let adapter = VirtualControllerAdapter::seeded([&state]);
        adapter.connect(state.id, &state.credentials).await.unwrap();

        let devices = adapter.capabilities(state.id).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_type, DeviceType::Fan);
    }

    #[tokio::test]
    async fn should_reject_commands_after_disconnect() {
        let state = controller(BRAND, None);
        let adapter = VirtualControllerAdapter::seeded([&state]);
        adapter.connect(state.id, &state.credentials).await.unwrap();
        adapter.disconnect(state.id).await.unwrap();

        let result = adapter.apply_command(state.id, 1, DeviceCommand::TurnOn).await;
        assert!(matches!(result, Err(AdapterError::Unreachable(_))));
    }
}
