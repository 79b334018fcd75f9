//! Device adapter port: one implementation per controller brand.
//!
//! The engine never speaks a brand's wire protocol. It looks an adapter up
//! by the controller's `brand` string in an [`AdapterRegistry`] and calls
//! the uniform contract below.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use roomhub_domain::device::{CommandOutcome, ConnectResult, Credentials, DeviceCommand, DeviceState};
use roomhub_domain::error::{AdapterError, ConfigurationError};
use roomhub_domain::id::ControllerId;

/// Capability contract of a controller brand.
///
/// Object-safe so adapters of different brands can live side by side in
/// one registry.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Brand key this adapter is registered under (e.g. `"virtual"`).
    fn brand(&self) -> &str;

    /// Establish a session for a controller.
    ///
    /// Calling twice with the same credentials either reuses or replaces
    /// the session; it never leaves the adapter in a broken state.
    ///
    /// # Errors
    ///
    /// [`AdapterError::AuthFailed`] on bad credentials,
    /// [`AdapterError::Unreachable`] when the controller cannot be reached.
    async fn connect(
        &self,
        controller_id: ControllerId,
        credentials: &Credentials,
    ) -> Result<ConnectResult, AdapterError>;

    /// Tear down a controller session. Callers log and ignore failures.
    ///
    /// # Errors
    ///
    /// Any adapter failure while closing the session.
    async fn disconnect(&self, controller_id: ControllerId) -> Result<(), AdapterError>;

    /// Current state of every port on a connected controller.
    ///
    /// # Errors
    ///
    /// Any adapter failure; [`AdapterError::AuthFailed`] when not connected.
    async fn capabilities(&self, controller_id: ControllerId)
    -> Result<Vec<DeviceState>, AdapterError>;

    /// Apply a command to one port.
    ///
    /// The returned `actual_value` may be lower than requested when the
    /// hardware clamps; that is not an error.
    ///
    /// # Errors
    ///
    /// Any [`AdapterError`]; see [`AdapterError::is_retryable`].
    async fn apply_command(
        &self,
        controller_id: ControllerId,
        port: u8,
        command: DeviceCommand,
    ) -> Result<CommandOutcome, AdapterError>;
}

/// Lookup table of adapters keyed by brand.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn DeviceAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own brand, replacing any previous one.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn DeviceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn DeviceAdapter>) {
        self.adapters.insert(adapter.brand().to_string(), adapter);
    }

    /// Adapter for `brand`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownBrand`] when nothing is
    /// registered for that brand.
    pub fn get(&self, brand: &str) -> Result<Arc<dyn DeviceAdapter>, ConfigurationError> {
        self.adapters
            .get(brand)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownBrand(brand.to_string()))
    }

    /// Registered brand names, sorted.
    #[must_use]
    pub fn brands(&self) -> Vec<&str> {
        let mut brands: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        brands.sort_unstable();
        brands
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("brands", &self.brands())
            .finish()
    }
}
