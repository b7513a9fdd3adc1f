//! NovaCart realtime notifications.
//!
//! Authenticates WebSocket connections, keeps a per-user registry of live
//! connections, and fans notification changes out to every open session
//! of a user. The REST endpoints are the authoritative mutation path.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod gate;
pub mod registry;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, Request};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{warn, Span};

use crate::state::AppState;

/// Full HTTP surface: WebSocket endpoint, REST API, health check.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origin);
    Router::new()
        // WebSocket endpoint.
        .route("/ws", get(ws::ws_handler))
        // Health check (useful for liveness probes).
        .route("/healthz", get(healthz))
        .merge(api::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(http_span))
                .layer(cors),
        )
        .with_state(state)
}

/// Request span with the path only. `/ws` carries the session token in its
/// query string, which must not end up in logs.
fn http_span(request: &Request<Body>) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = request.uri().path(),
        version = ?request.version(),
    )
}

fn cors_layer(origin: &str) -> CorsLayer {
    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(true),
        Err(e) => {
            warn!(origin, "invalid CORS origin, cross-origin requests disabled: {e}");
            CorsLayer::new()
        }
    }
}

/// Liveness probe with registry counters.
async fn healthz(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "instance": state.config.server_instance,
        "users": state.registry.user_count(),
        "connections": state.registry.connection_count(),
    }))
}
