//! Wire protocol and domain types.
//!
//! Covers: handshake, the server→connection event envelope, the
//! connection→server request envelope, and the notification record
//! as it is stored and conveyed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════
// Identities
// ═══════════════════════════════════════════════════════════════

/// An authenticated user. Opaque; only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-unique handle of one live socket (one browser tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    Promotion,
    NewOffer,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderShipped => "ORDER_SHIPPED",
            Self::OrderDelivered => "ORDER_DELIVERED",
            Self::OrderCancelled => "ORDER_CANCELLED",
            Self::Promotion => "PROMOTION",
            Self::NewOffer => "NEW_OFFER",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER_SHIPPED" => Ok(Self::OrderShipped),
            "ORDER_DELIVERED" => Ok(Self::OrderDelivered),
            "ORDER_CANCELLED" => Ok(Self::OrderCancelled),
            "PROMOTION" => Ok(Self::Promotion),
            "NEW_OFFER" => Ok(Self::NewOffer),
            other => Err(format!("unknown notification type '{other}'")),
        }
    }
}

/// A notification as held by the store. The realtime layer only conveys it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub read: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub action_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub action_url: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
// Handshake
// ═══════════════════════════════════════════════════════════════

/// Auth payload presented on the upgrade request (`?token=..&userId=..`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Handshake {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
// Server → connection events
// ═══════════════════════════════════════════════════════════════

/// Envelope `{ "event": <name>, "data": <payload> }` pushed to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Auth rejection or a failed per-request store operation.
    #[serde(rename = "channel-error")]
    ChannelError(ErrorPayload),
    /// Unread backlog, newest first. Always the first event after join.
    #[serde(rename = "notifications:initial")]
    Initial(Vec<Notification>),
    #[serde(rename = "notification:new")]
    Created(Notification),
    #[serde(rename = "notification:updated")]
    Updated(Notification),
    #[serde(rename = "notification:deleted")]
    Deleted(IdPayload),
    #[serde(rename = "notifications:all-read")]
    AllRead(AllReadPayload),
    /// Ack of this connection's own mark-read request.
    #[serde(rename = "notification:marked-read")]
    MarkedRead(IdPayload),
    /// Response to this connection's own fetch request.
    #[serde(rename = "notifications:list")]
    List(Vec<Notification>),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::ChannelError(ErrorPayload {
            message: message.into(),
        })
    }

    /// Wire name of the event, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChannelError(_) => "channel-error",
            Self::Initial(_) => "notifications:initial",
            Self::Created(_) => "notification:new",
            Self::Updated(_) => "notification:updated",
            Self::Deleted(_) => "notification:deleted",
            Self::AllRead(_) => "notifications:all-read",
            Self::MarkedRead(_) => "notification:marked-read",
            Self::List(_) => "notifications:list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllReadPayload {
    pub user_id: UserId,
}

// ═══════════════════════════════════════════════════════════════
// Connection → server requests
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientRequest {
    /// Payload is the bare notification id.
    #[serde(rename = "notification:mark-read")]
    MarkRead(String),
    #[serde(rename = "notifications:fetch")]
    Fetch(Option<FetchParams>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Notification {
        Notification {
            id: "n1".into(),
            user_id: UserId::new("u1"),
            kind: NotificationType::OrderShipped,
            title: "Order shipped".into(),
            message: "Your order #12345 is on its way!".into(),
            read: false,
            metadata: Some(json!({ "orderId": "12345" })),
            action_url: None,
            created_at: "2025-01-01T10:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn server_event_uses_event_data_envelope() {
        let v = serde_json::to_value(ServerEvent::Created(sample())).unwrap();
        assert_eq!(v["event"], "notification:new");
        assert_eq!(v["data"]["userId"], "u1");
        assert_eq!(v["data"]["type"], "ORDER_SHIPPED");
        assert_eq!(v["data"]["read"], false);
        assert_eq!(v["data"]["metadata"]["orderId"], "12345");
    }

    #[test]
    fn error_and_ack_payload_shapes() {
        let v = serde_json::to_value(ServerEvent::error("Missing user ID")).unwrap();
        assert_eq!(v, json!({ "event": "channel-error", "data": { "message": "Missing user ID" } }));

        let v = serde_json::to_value(ServerEvent::AllRead(AllReadPayload {
            user_id: UserId::new("u1"),
        }))
        .unwrap();
        assert_eq!(v, json!({ "event": "notifications:all-read", "data": { "userId": "u1" } }));
    }

    #[test]
    fn parses_mark_read_with_bare_id() {
        let req: ClientRequest =
            serde_json::from_value(json!({ "event": "notification:mark-read", "data": "n42" })).unwrap();
        assert_eq!(req, ClientRequest::MarkRead("n42".into()));
    }

    #[test]
    fn parses_fetch_with_partial_params() {
        let req: ClientRequest =
            serde_json::from_value(json!({ "event": "notifications:fetch", "data": { "offset": 10 } }))
                .unwrap();
        assert_eq!(
            req,
            ClientRequest::Fetch(Some(FetchParams {
                limit: None,
                offset: Some(10)
            }))
        );

        let req: ClientRequest =
            serde_json::from_value(json!({ "event": "notifications:fetch", "data": null })).unwrap();
        assert_eq!(req, ClientRequest::Fetch(None));
    }

    #[test]
    fn rejects_unknown_request() {
        let res: Result<ClientRequest, _> =
            serde_json::from_value(json!({ "event": "notification:explode", "data": 1 }));
        assert!(res.is_err());
    }

    #[test]
    fn notification_type_round_trips_through_str() {
        for kind in [
            NotificationType::OrderShipped,
            NotificationType::OrderDelivered,
            NotificationType::OrderCancelled,
            NotificationType::Promotion,
            NotificationType::NewOffer,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationType>().unwrap(), kind);
        }
        assert!("SHIPPED".parse::<NotificationType>().is_err());
    }
}
