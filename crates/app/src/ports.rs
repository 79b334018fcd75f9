//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the engine and the outside world.
//! They are defined here (in `app`) so that both the engine and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod device_adapter;
pub mod notification;
pub mod repository;

pub use device_adapter::{AdapterRegistry, DeviceAdapter};
pub use notification::{Notification, NotificationSink};
pub use repository::AutomationRepository;
