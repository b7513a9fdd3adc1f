//! WebSocket transport for the session gate.
//!
//! Flow per connection:
//! 1. Accept WS upgrade, read `token` + `userId` from the query string
//! 2. Run the gate: reject (one `channel-error`, then Close) or join
//! 3. Message loop: client requests, fan-out deliveries, liveness
//! 4. On disconnect/drop: leave the registry

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::error::AuthError;
use crate::gate::SessionGate;
use crate::registry::{event_queue, EventReceiver};
use crate::state::AppState;
use crate::types::{ClientRequest, Handshake};

/// Close codes sent after a rejected handshake.
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;

type Sink = SplitSink<WebSocket, Message>;

/// Axum handler for GET /ws — upgrades to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(handshake): Query<Handshake>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, handshake))
}

/// Per-connection driver around the gate.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, handshake: Handshake) {
    let (sink, mut receiver) = socket.split();
    let (out_tx, out_rx) = event_queue();
    let writer = tokio::spawn(writer_task(sink, out_rx, state.config.ping_interval));

    // Fan-out deliveries queue here and are only forwarded once `admit`
    // has pushed the backlog, so the backlog is always first.
    let (fan_tx, mut fan_rx) = event_queue();
    let mut gate = SessionGate::new(Arc::clone(&state), out_tx.clone());

    // ── Phase 1: authenticate + join ────────────────────────
    if let Err(e) = gate.admit(&handshake, fan_tx).await {
        drop(gate);
        drop(out_tx);
        let code = match e {
            AuthError::InvalidSignature { expired: true } => CLOSE_TOKEN_EXPIRED,
            _ => CLOSE_TOKEN_INVALID,
        };
        // Writer returns the sink once the `channel-error` is flushed.
        if let Ok(mut sink) = writer.await {
            let frame = CloseFrame {
                code,
                reason: e.to_string().into(),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
        }
        return;
    }

    let conn_id = gate.conn_id();
    let user_id = gate.user_id().cloned();

    // ── Phase 2: message loop ───────────────────────────────
    let liveness = state.config.ping_interval + state.config.pong_timeout;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    last_seen = Instant::now();
                    match serde_json::from_str::<ClientRequest>(text.as_str()) {
                        Ok(request) => gate.handle(request).await,
                        Err(e) => gate.invalid_request(&e.to_string()),
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    last_seen = Instant::now();
                    gate.invalid_request("binary frames are not supported");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // axum auto-pongs
                    last_seen = Instant::now();
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(conn_id = %conn_id, ?frame, "client closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, user_id = ?user_id, "ws recv error: {e}");
                    break;
                }
                None => break,
            },
            Some(event) = fan_rx.recv() => match out_tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!(conn_id = %conn_id, user_id = ?user_id, event = event.name(), "outbox full, event dropped");
                }
                Err(TrySendError::Closed(_)) => break,
            },
            _ = sleep_until(last_seen + liveness) => {
                warn!(conn_id = %conn_id, user_id = ?user_id, "no pong within liveness window, dropping");
                break;
            }
        }
    }

    // ── Phase 3: cleanup ────────────────────────────────────
    gate.close();
    drop(gate);
    drop(fan_rx);
    drop(out_tx);

    if let Ok(mut sink) = writer.await {
        let _ = sink.close().await;
    }
    info!(conn_id = %conn_id, user_id = ?user_id, "connection closed");
}

/// Owns the sink: serializes outbound events and pings on an interval.
/// Returns the sink once every outbox sender is gone (or the socket broke).
async fn writer_task(
    mut sink: Sink,
    mut rx: EventReceiver,
    ping_every: Duration,
) -> Sink {
    let mut ping = interval_at(Instant::now() + ping_every, ping_every);
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&*event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(event = event.name(), "serialize error: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    sink
}
