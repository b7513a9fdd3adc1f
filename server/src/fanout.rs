//! Fan-out emitter: deliver one event to every live connection of a user.
//!
//! Best-effort and in-memory. A user with no live connections simply
//! misses the event; the store stays authoritative and the next join
//! (backlog) or fetch reflects it.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;
use crate::types::{AllReadPayload, IdPayload, Notification, ServerEvent, UserId};

#[derive(Debug, Clone)]
pub struct FanoutEmitter {
    registry: Arc<ConnectionRegistry>,
}

impl FanoutEmitter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `event` to each connection registered for `user_id`.
    /// Returns the number of delivery attempts; per-connection failures
    /// (a full queue, or one whose connection is already gone) are not
    /// retried.
    pub fn emit(&self, user_id: &UserId, event: ServerEvent) -> usize {
        let targets = self.registry.resolve(user_id);
        if targets.is_empty() {
            debug!(user_id = %user_id, event = event.name(), "no live connections, event dropped");
            return 0;
        }

        let event = Arc::new(event);
        for handle in &targets {
            match handle.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(user_id = %user_id, conn_id = %handle.id, event = event.name(), "connection queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(user_id = %user_id, conn_id = %handle.id, "connection gone, skipped");
                }
            }
        }
        debug!(user_id = %user_id, event = event.name(), connections = targets.len(), "fan-out");
        targets.len()
    }

    pub fn notification_created(&self, notification: &Notification) -> usize {
        self.emit(&notification.user_id, ServerEvent::Created(notification.clone()))
    }

    pub fn notification_updated(&self, notification: &Notification) -> usize {
        self.emit(&notification.user_id, ServerEvent::Updated(notification.clone()))
    }

    pub fn notification_deleted(&self, user_id: &UserId, id: &str) -> usize {
        self.emit(user_id, ServerEvent::Deleted(IdPayload { id: id.to_owned() }))
    }

    pub fn all_marked_read(&self, user_id: &UserId) -> usize {
        self.emit(
            user_id,
            ServerEvent::AllRead(AllReadPayload {
                user_id: user_id.clone(),
            }),
        )
    }
}
