//! In-process notification bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use roomhub_domain::error::RoomHubError;

use crate::ports::{Notification, NotificationSink};

/// In-process fan-out of [`Notification`]s using a tokio [`broadcast`]
/// channel.
///
/// Notifying succeeds even when there are no active subscribers (the
/// notification is simply dropped). Slow subscribers lag and lose the
/// oldest entries rather than blocking the engine.
pub struct InProcessNotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl InProcessNotificationBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to notifications published *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl NotificationSink for InProcessNotificationBus {
    fn notify(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), RoomHubError>> + Send {
        // send fails only when there are zero receivers
        let _ = self.sender.send(notification);
        async { Ok(()) }
    }
}
