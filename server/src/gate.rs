//! Session gate — per-connection lifecycle.
//!
//! ```text
//! Connecting → Authenticating → Joined ⟲ (mark-read / fetch) → Closed
//!                    └──────────── rejected ───────────────→ Closed
//! ```
//!
//! The gate knows nothing about the transport. It writes replies into the
//! connection's outbox and hands the registry a separate fan-out queue;
//! the transport decides when to start draining that queue (after
//! `admit` returns, so the backlog is always the first event).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::error::{AuthError, StoreError};
use crate::registry::{ConnectionHandle, ConnectionRegistry, EventSender};
use crate::state::AppState;
use crate::store::Page;
use crate::types::{ClientRequest, ConnectionId, FetchParams, Handshake, IdPayload, ServerEvent, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Connecting,
    Authenticating,
    Joined,
    Closed,
}

/// Registry membership of one joined connection. Dropping it unregisters,
/// so removal happens on every exit path, including task cancellation.
#[derive(Debug)]
pub struct Membership {
    registry: Arc<ConnectionRegistry>,
    user_id: UserId,
    conn_id: ConnectionId,
}

impl Membership {
    fn join(registry: Arc<ConnectionRegistry>, user_id: UserId, handle: ConnectionHandle) -> Self {
        let conn_id = handle.id;
        registry.register(&user_id, handle);
        Self {
            registry,
            user_id,
            conn_id,
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.registry.unregister(&self.user_id, self.conn_id);
    }
}

pub struct SessionGate {
    conn_id: ConnectionId,
    state: GateState,
    user_id: Option<UserId>,
    rejection: Option<AuthError>,
    membership: Option<Membership>,
    app: Arc<AppState>,
    outbox: EventSender,
}

impl SessionGate {
    pub fn new(app: Arc<AppState>, outbox: EventSender) -> Self {
        Self {
            conn_id: ConnectionId::new(),
            state: GateState::Connecting,
            user_id: None,
            rejection: None,
            membership: None,
            app,
            outbox,
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Authenticate, join and push the unread backlog.
    ///
    /// On rejection exactly one `channel-error` is queued and the gate is
    /// `Closed`; the caller must close the transport. Verification runs at
    /// most once: later calls return the first outcome.
    pub async fn admit(&mut self, handshake: &Handshake, fanout: EventSender) -> Result<UserId, AuthError> {
        match self.state {
            GateState::Connecting => {}
            GateState::Authenticating | GateState::Joined => {
                if let Some(user_id) = &self.user_id {
                    return Ok(user_id.clone());
                }
            }
            GateState::Closed => {
                if let Some(rejection) = &self.rejection {
                    return Err(rejection.clone());
                }
            }
        }
        self.state = GateState::Authenticating;

        let user_id = match self.app.verifier.verify_handshake(handshake) {
            Ok(user_id) => user_id,
            Err(e) => {
                warn!(conn_id = %self.conn_id, claimed = ?handshake.user_id, reason = ?e, "connection rejected");
                self.send(ServerEvent::error(e.to_string()));
                self.state = GateState::Closed;
                self.rejection = Some(e.clone());
                return Err(e);
            }
        };

        self.membership = Some(Membership::join(
            Arc::clone(&self.app.registry),
            user_id.clone(),
            ConnectionHandle {
                id: self.conn_id,
                sender: fanout,
            },
        ));
        self.user_id = Some(user_id.clone());
        self.state = GateState::Joined;
        info!(user_id = %user_id, conn_id = %self.conn_id, "joined");

        self.push_backlog(&user_id).await;
        Ok(user_id)
    }

    /// Best-effort: a failed backlog query is logged, the session stays joined.
    async fn push_backlog(&self, user_id: &UserId) {
        let limit = self.app.config.backlog_size;
        match self.bounded(self.app.store.get_unread(user_id, limit)).await {
            Ok(unread) => {
                info!(user_id = %user_id, count = unread.len(), "sent unread backlog");
                self.send(ServerEvent::Initial(unread));
            }
            Err(e) => error!(user_id = %user_id, conn_id = %self.conn_id, "backlog fetch failed: {e}"),
        }
    }

    /// Handle one request from a joined connection. Replies go to this
    /// connection only; failures never leave `Joined`.
    pub async fn handle(&self, request: ClientRequest) {
        let Some(user_id) = self.joined_user() else {
            warn!(conn_id = %self.conn_id, state = ?self.state, "request outside joined session ignored");
            return;
        };

        match request {
            ClientRequest::MarkRead(id) => self.mark_read(user_id, id).await,
            ClientRequest::Fetch(params) => self.fetch(user_id, params.unwrap_or_default()).await,
        }
    }

    /// A frame that did not parse as a request.
    pub fn invalid_request(&self, reason: &str) {
        warn!(conn_id = %self.conn_id, user_id = ?self.user_id, "invalid request: {reason}");
        self.send(ServerEvent::error("Invalid request"));
    }

    /// Leave the registry and enter `Closed`. Idempotent.
    pub fn close(&mut self) {
        if let Some(membership) = self.membership.take() {
            drop(membership);
            info!(user_id = ?self.user_id, conn_id = %self.conn_id, "disconnected");
        }
        self.state = GateState::Closed;
    }

    async fn mark_read(&self, user_id: &UserId, id: String) {
        let result = async {
            // Only the owner may flip the flag.
            match self.bounded(self.app.store.get_by_id(&id)).await? {
                Some(existing) if &existing.user_id == user_id => {}
                _ => return Err(StoreError::NotFound(id.clone())),
            }
            self.bounded(self.app.store.set_read(&id)).await
        }
        .await;

        match result {
            Ok(_) => {
                info!(user_id = %user_id, notification_id = %id, "marked read");
                self.send(ServerEvent::MarkedRead(IdPayload { id }));
            }
            Err(e) => {
                error!(user_id = %user_id, notification_id = %id, "mark-read failed: {e}");
                self.send(ServerEvent::error("Error updating notification"));
            }
        }
    }

    async fn fetch(&self, user_id: &UserId, params: FetchParams) {
        let page = Page::clamped(
            params.limit,
            params.offset,
            self.app.config.default_page_size,
            false,
        );
        match self.bounded(self.app.store.get_page(user_id, page)).await {
            Ok(list) => self.send(ServerEvent::List(list)),
            Err(e) => {
                error!(user_id = %user_id, conn_id = %self.conn_id, "fetch failed: {e}");
                self.send(ServerEvent::error("Error fetching notifications"));
            }
        }
    }

    fn joined_user(&self) -> Option<&UserId> {
        match self.state {
            GateState::Joined => self.user_id.as_ref(),
            _ => None,
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.app.config.store_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    fn send(&self, event: ServerEvent) {
        match self.outbox.try_send(Arc::new(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(conn_id = %self.conn_id, event = event.name(), "outbox full, reply dropped");
            }
            // The outbox only closes once the writer is gone; nothing to report to.
            Err(TrySendError::Closed(_)) => debug!(conn_id = %self.conn_id, "outbox closed"),
        }
    }
}

impl Drop for SessionGate {
    fn drop(&mut self) {
        self.close();
    }
}
