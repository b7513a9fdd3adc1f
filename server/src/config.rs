//! Server configuration — all from environment variables.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for WebSocket + REST.
    pub listen_addr: String,
    /// Postgres connection string. `None` runs on the in-memory store.
    pub database_url: Option<String>,
    /// HMAC secret used to sign and verify session credentials.
    /// `None` means a random per-process secret is generated at startup.
    pub jwt_secret: Option<String>,
    /// Required `iss` claim, if any.
    pub jwt_issuer: Option<String>,
    /// Max unread notifications pushed as `notifications:initial` on join.
    pub backlog_size: u32,
    /// Page size used when a fetch request omits `limit`.
    pub default_page_size: u32,
    /// Upper bound on a single store call issued by a session.
    pub store_timeout: Duration,
    /// Interval between server pings on an idle socket.
    pub ping_interval: Duration,
    /// Grace period after a ping before the peer is considered gone.
    pub pong_timeout: Duration,
    /// Browser origin allowed by CORS.
    pub cors_origin: String,
    /// Process identity; the connection registry is scoped to it.
    pub server_instance: String,
    /// Log level filter.
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".into(),
            database_url: None,
            jwt_secret: None,
            jwt_issuer: None,
            backlog_size: 10,
            default_page_size: 20,
            store_timeout: Duration::from_millis(5000),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            cors_origin: "http://localhost:3000".into(),
            server_instance: "local".into(),
            log_level: "novacart_realtime=info,tower_http=info".into(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: non_empty("DATABASE_URL"),
            jwt_secret: non_empty("JWT_SECRET").or_else(|| non_empty("NEXTAUTH_SECRET")),
            jwt_issuer: non_empty("JWT_ISSUER"),
            backlog_size: parsed("BACKLOG_SIZE").unwrap_or(defaults.backlog_size),
            default_page_size: parsed("DEFAULT_PAGE_SIZE").unwrap_or(defaults.default_page_size),
            store_timeout: parsed("STORE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            ping_interval: parsed("PING_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ping_interval),
            pong_timeout: parsed("PONG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.pong_timeout),
            cors_origin: non_empty("CORS_ORIGIN")
                .or_else(|| non_empty("NEXT_PUBLIC_APP_URL"))
                .unwrap_or(defaults.cors_origin),
            server_instance: non_empty("SERVER_INSTANCE").unwrap_or_else(hostname),
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".into())
}
