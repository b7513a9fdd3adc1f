//! REST endpoints for notifications.
//!
//! Every mutation is applied to the store first and then fanned out to the
//! owner's live connections, so other tabs converge without polling.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::Page;
use crate::types::{NewNotification, Notification, NotificationType, UserId};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list).post(create))
        .route("/api/notifications/mark-all-read", put(mark_all_read))
        .route("/api/notifications/{id}", get(get_one).delete(delete_one))
        .route("/api/notifications/{id}/mark-read", put(mark_read))
}

/// Caller identity from `Authorization: Bearer <token>`.
pub struct AuthUser(pub UserId);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        state.verifier.verify_bearer(token).map(AuthUser).map_err(|e| {
            debug!(reason = ?e, "rest auth rejected");
            ApiError::Unauthorized(e)
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    #[serde(default)]
    unread_only: bool,
}

/// GET /api/notifications
async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page::clamped(q.limit, q.offset, state.config.default_page_size, q.unread_only);
    let notifications = state.store.get_page(&user_id, page).await?;
    let total = state.store.count(&user_id, page.unread_only).await?;

    Ok(Json(json!({
        "notifications": notifications,
        "total": total,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    user_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    message: Option<String>,
    metadata: Option<JsonValue>,
    action_url: Option<String>,
}

/// POST /api/notifications
async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let filled = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(user_id), Some(kind), Some(title), Some(message)) = (
        filled(body.user_id),
        filled(body.kind),
        filled(body.title),
        filled(body.message),
    ) else {
        return Err(ApiError::BadRequest(
            "Missing required fields: userId, type, title, message".into(),
        ));
    };
    let kind: NotificationType = kind.parse().map_err(ApiError::BadRequest)?;

    let notification = state
        .store
        .create(NewNotification {
            user_id: UserId::new(user_id),
            kind,
            title,
            message,
            metadata: body.metadata.filter(|m| !m.is_null()),
            action_url: filled(body.action_url),
        })
        .await?;

    let delivered = state.fanout(|e| e.notification_created(&notification));
    info!(
        caller = %caller,
        user_id = %notification.user_id,
        notification_id = %notification.id,
        connections = delivered,
        "notification created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Notification created successfully",
            "notification": notification,
        })),
    ))
}

/// GET /api/notifications/{id}
async fn get_one(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = owned(&state, &id, &user_id).await?;
    Ok(Json(json!({ "notification": notification })))
}

/// DELETE /api/notifications/{id}
async fn delete_one(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = owned(&state, &id, &user_id).await?;
    state.store.delete_by_id(&id).await?;

    let delivered = state.fanout(|e| e.notification_deleted(&existing.user_id, &id));
    info!(user_id = %user_id, notification_id = %id, connections = delivered, "notification deleted");

    Ok(Json(json!({ "message": "Notification deleted successfully" })))
}

/// PUT /api/notifications/{id}/mark-read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    owned(&state, &id, &user_id).await?;
    let notification = state.store.set_read(&id).await?;

    let delivered = state.fanout(|e| e.notification_updated(&notification));
    info!(user_id = %user_id, notification_id = %id, connections = delivered, "notification marked read");

    Ok(Json(json!({
        "message": "Notification marked as read",
        "notification": notification,
    })))
}

/// PUT /api/notifications/mark-all-read
async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.store.set_all_read(&user_id).await?;

    let delivered = state.fanout(|e| e.all_marked_read(&user_id));
    info!(user_id = %user_id, count, connections = delivered, "all notifications marked read");

    Ok(Json(json!({
        "message": "All notifications marked as read",
        "count": count,
    })))
}

/// Load `id` and check it belongs to `user_id`.
async fn owned(state: &AppState, id: &str, user_id: &UserId) -> Result<Notification, ApiError> {
    let notification = state.store.get_by_id(id).await?.ok_or(ApiError::NotFound)?;
    if &notification.user_id != user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(notification)
}
