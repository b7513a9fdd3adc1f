//! Connection registry: which live connections belong to which user.
//!
//! A user can hold several concurrent connections (one per tab/device),
//! so this is a multimap `UserId -> {ConnectionId -> sender}`. Empty
//! entries are dropped on the last unregister. Process-local and
//! volatile; clients rebuild it by reconnecting.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::types::{ConnectionId, ServerEvent, UserId};

/// Depth of each per-connection queue. A connection that falls this far
/// behind loses events instead of buffering without bound.
pub const QUEUE_CAPACITY: usize = 256;

/// Sender half of a connection's event queue.
pub type EventSender = mpsc::Sender<Arc<ServerEvent>>;
pub type EventReceiver = mpsc::Receiver<Arc<ServerEvent>>;

/// Bounded queue feeding one connection.
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::channel(QUEUE_CAPACITY)
}

/// One registered connection: its handle plus the queue that reaches it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub sender: EventSender,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    members: DashMap<UserId, HashMap<ConnectionId, EventSender>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle` under `user_id`. Re-registering a known handle is a
    /// no-op and keeps the original sender. Returns whether it was added.
    pub fn register(&self, user_id: &UserId, handle: ConnectionHandle) -> bool {
        let mut conns = self.members.entry(user_id.clone()).or_default();
        if conns.contains_key(&handle.id) {
            return false;
        }
        conns.insert(handle.id, handle.sender);
        tracing::debug!(user_id = %user_id, conn_id = %handle.id, connections = conns.len(), "connection registered");
        true
    }

    /// Remove one handle. Drops the user's entry when it was the last one.
    /// Returns whether the handle was present.
    pub fn unregister(&self, user_id: &UserId, id: ConnectionId) -> bool {
        let removed = match self.members.get_mut(user_id) {
            Some(mut conns) => conns.remove(&id).is_some(),
            None => false,
        };
        // Guard above is released; re-check emptiness under the shard lock.
        self.members.remove_if(user_id, |_, conns| conns.is_empty());
        if removed {
            tracing::debug!(user_id = %user_id, conn_id = %id, "connection unregistered");
        }
        removed
    }

    /// Snapshot of the live handles for `user_id` (possibly empty).
    pub fn resolve(&self, user_id: &UserId) -> Vec<ConnectionHandle> {
        self.members
            .get(user_id)
            .map(|conns| {
                conns
                    .iter()
                    .map(|(id, sender)| ConnectionHandle {
                        id: *id,
                        sender: sender.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.members.contains_key(user_id)
    }

    /// Number of users with at least one live connection.
    pub fn user_count(&self) -> usize {
        self.members.len()
    }

    /// Total live connections across all users.
    pub fn connection_count(&self) -> usize {
        self.members.iter().map(|e| e.value().len()).sum()
    }
}
