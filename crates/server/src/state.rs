//! Application state shared across handlers.

use std::sync::Arc;

use miniapp_core::{CounterStore, IdentityStore, SessionCodec, SignatureVerifier};

use crate::config::ServerConfig;
use crate::services::identity::IdentityResolver;

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("bot token cannot key the signature verifier: {0}")]
    SigningKey(String),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// configured stores and the protocol components keyed from configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    store: Arc<dyn IdentityStore>,
    counters: Arc<dyn CounterStore>,
    verifier: SignatureVerifier,
    codec: SessionCodec,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `store` - Identity store (Postgres in production)
    /// * `counters` - Rate-limit counter store
    ///
    /// # Errors
    ///
    /// Returns an error if the bot token cannot key the verifier.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn IdentityStore>,
        counters: Arc<dyn CounterStore>,
    ) -> Result<Self, StateError> {
        let verifier = SignatureVerifier::new(&config.bot_token)
            .map_err(|e| StateError::SigningKey(e.to_string()))?;
        let codec = SessionCodec::new(&config.session_secret, config.session.ttl());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                counters,
                verifier,
                codec,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the identity store.
    #[must_use]
    pub fn store(&self) -> &dyn IdentityStore {
        self.inner.store.as_ref()
    }

    /// Get a reference to the rate-limit counter store.
    #[must_use]
    pub fn counters(&self) -> &dyn CounterStore {
        self.inner.counters.as_ref()
    }

    /// Get a reference to the init-data signature verifier.
    #[must_use]
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.inner.verifier
    }

    /// Get a reference to the session codec.
    #[must_use]
    pub fn codec(&self) -> &SessionCodec {
        &self.inner.codec
    }

    /// Identity resolver over the configured store.
    #[must_use]
    pub fn identity(&self) -> IdentityResolver<'_> {
        IdentityResolver::new(self.store())
    }
}
