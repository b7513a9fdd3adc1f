//! Shared helpers: spin up the router on a random port, connect sockets,
//! read typed events.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use novacart_realtime::auth::TokenVerifier;
use novacart_realtime::config::Config;
use novacart_realtime::state::AppState;
use novacart_realtime::store::{MemoryStore, NotificationStore};
use novacart_realtime::types::{Notification, NotificationType, ServerEvent, UserId};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const SECRET: &[u8] = b"integration-secret";
pub const DAY: Duration = Duration::from_secs(86_400);

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|store, verifier, config| AppState::with_verifier(store, verifier, config)).await
    }

    pub async fn start_without_emitter() -> Self {
        Self::start_with(|store, verifier, config| AppState::without_emitter(store, verifier, config)).await
    }

    pub async fn start_with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::launch(Arc::clone(&store), store, config).await
    }

    /// Serve through `wrap(memory)` while keeping direct access to the
    /// underlying memory store for seeding and assertions.
    pub async fn start_wrapped(
        wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn NotificationStore>,
    ) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let served = wrap(Arc::clone(&memory));
        Self::launch(memory, served, Config::default()).await
    }

    async fn start_with(
        build: impl FnOnce(Arc<MemoryStore>, TokenVerifier, Config) -> Arc<AppState>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = build(Arc::clone(&store), TokenVerifier::new(SECRET, None), Config::default());
        Self::serve(store, state).await
    }

    async fn launch(memory: Arc<MemoryStore>, served: Arc<dyn NotificationStore>, config: Config) -> Self {
        let state = AppState::with_verifier(served, TokenVerifier::new(SECRET, None), config);
        Self::serve(memory, state).await
    }

    async fn serve(store: Arc<MemoryStore>, state: Arc<AppState>) -> Self {
        let app = novacart_realtime::build_router(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, store }
    }

    pub fn token(&self, user: &str) -> String {
        self.state.verifier.issue(&UserId::new(user), None, DAY).unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect_raw(&self, query: &str) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws?{}", self.addr, query))
            .await
            .expect("ws connect");
        ws
    }

    /// Connect with a token signed for `signed_for`, claiming `claimed`.
    pub async fn connect_as(&self, signed_for: &str, claimed: &str) -> Client {
        self.connect_raw(&format!("token={}&userId={}", self.token(signed_for), claimed))
            .await
    }

    /// Connect as `user` and consume the backlog event.
    pub async fn join(&self, user: &str) -> (Client, Vec<Notification>) {
        let mut ws = self.connect_as(user, user).await;
        match next_event(&mut ws).await {
            ServerEvent::Initial(backlog) => (ws, backlog),
            other => panic!("expected notifications:initial, got {other:?}"),
        }
    }

    pub async fn is_read(&self, id: &str) -> bool {
        self.store
            .get_by_id(id)
            .await
            .unwrap()
            .map(|n| n.read)
            .unwrap_or(false)
    }

    pub fn live_connections(&self, user: &str) -> usize {
        self.state.registry.resolve(&UserId::new(user)).len()
    }

    /// Poll until `user` has `n` live connections (unregister is async).
    pub async fn wait_for_connections(&self, user: &str, n: usize) {
        for _ in 0..100 {
            if self.live_connections(user) == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "expected {n} connections for {user}, have {}",
            self.live_connections(user)
        );
    }
}

pub fn notification(user: &str, id: &str, minute: u32, read: bool) -> Notification {
    Notification {
        id: id.into(),
        user_id: UserId::new(user),
        kind: NotificationType::OrderShipped,
        title: "Order shipped".into(),
        message: format!("Order {id} is on its way"),
        read,
        metadata: None,
        action_url: Some("/orders".into()),
        created_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, minute, 0).unwrap(),
    }
}

/// Next server event, skipping control frames.
pub async fn next_event(ws: &mut Client) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid event"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// True if no event arrives within a short window.
pub async fn stays_silent(ws: &mut Client) -> bool {
    loop {
        match tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
            Err(_) => return true,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(_) => return false,
        }
    }
}

/// Next close frame, skipping control frames.
pub async fn expect_close(ws: &mut Client) -> Option<CloseFrame<'static>> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("timed out waiting for close");
        match msg {
            Some(Ok(Message::Close(frame))) => return frame,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
            Some(Err(_)) | None => return None,
        }
    }
}

pub async fn send(ws: &mut Client, request: Value) {
    ws.send(Message::Text(request.to_string())).await.unwrap();
}
