//! # roomhub-app
//!
//! Application layer — the automation engine and its **port definitions**.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `AutomationRepository` — active workflows, dimmer configs, controller
//!     state, execution outcomes
//!   - `DeviceAdapter` — one implementation per controller brand, looked up
//!     through an `AdapterRegistry`
//!   - `NotificationSink` — outcomes, action reports and dimmer alerts
//! - Run the engine:
//!   - `TriggerDispatcher` — timer, schedule, sensor and manual triggers
//!   - `WorkflowExecutor` — graph walk under a per-workflow `ExecutionLocks`
//!   - `ActionExecutor` — target resolution, sessions, retries
//!   - `DimmerScheduler` — sunrise/sunset light ramps
//!   - `SensorCache` — latest reading per sensor with staleness
//! - Provide the in-process `InProcessNotificationBus`
//!
//! ## Dependency rule
//! Depends on `roomhub-domain` only, plus async runtime crates.
//! Never imports adapter crates.

pub mod action_executor;
pub mod dimmer_scheduler;
pub mod execution_locks;
pub mod notification_bus;
pub mod ports;
pub mod sensor_cache;
pub mod trigger_dispatcher;
pub mod workflow_executor;

#[cfg(test)]
mod testing;
