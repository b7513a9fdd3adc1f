//! novacart-realtime — notification fan-out server.

use std::sync::Arc;

use novacart_realtime::config::Config;
use novacart_realtime::db::PgStore;
use novacart_realtime::state::AppState;
use novacart_realtime::store::{MemoryStore, NotificationStore};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    // Load .env if present (local dev).
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Tracing.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(true);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("novacart-realtime starting");
    info!(listen = %config.listen_addr, instance = %config.server_instance);

    // ── Store ───────────────────────────────────────────────
    let store: Arc<dyn NotificationStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .expect("failed to connect to Postgres");
            info!("database ready");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set — using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // ── Shared state ────────────────────────────────────────
    let state = AppState::new(store, config.clone());

    // ── Routes ──────────────────────────────────────────────
    let app = novacart_realtime::build_router(state);

    // ── Bind & serve ────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind");

    info!(addr = %config.listen_addr, "novacart-realtime listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
