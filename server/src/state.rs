//! Shared server state — connection registry, store, and fan-out.
//!
//! Built once at startup and handed to both the socket layer and the REST
//! handlers; there is no process-global accessor.

use std::sync::Arc;

use tracing::debug;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::fanout::FanoutEmitter;
use crate::registry::ConnectionRegistry;
use crate::store::NotificationStore;

/// Shared state accessible from all handlers.
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub verifier: TokenVerifier,
    /// Live connections per user. Only valid inside this process.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out capability used by REST mutations. `None` means fan-out is
    /// not wired up yet; mutations still succeed and skip delivery.
    pub emitter: Option<FanoutEmitter>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn NotificationStore>, config: Config) -> Arc<Self> {
        let verifier = TokenVerifier::from_config(&config);
        Self::with_verifier(store, verifier, config)
    }

    pub fn with_verifier(
        store: Arc<dyn NotificationStore>,
        verifier: TokenVerifier,
        config: Config,
    ) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let emitter = Some(FanoutEmitter::new(Arc::clone(&registry)));
        Arc::new(Self {
            store,
            verifier,
            registry,
            emitter,
            config,
        })
    }

    /// Same as `with_verifier` but without a fan-out capability.
    pub fn without_emitter(
        store: Arc<dyn NotificationStore>,
        verifier: TokenVerifier,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            verifier,
            registry: Arc::new(ConnectionRegistry::new()),
            emitter: None,
            config,
        })
    }

    /// Run `f` against the emitter if one is wired. Absence is expected
    /// during startup and never an error.
    pub fn fanout(&self, f: impl FnOnce(&FanoutEmitter) -> usize) -> usize {
        match &self.emitter {
            Some(emitter) => f(emitter),
            None => {
                debug!("fan-out emitter unavailable, skipping delivery");
                0
            }
        }
    }
}
