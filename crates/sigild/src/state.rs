//! Application state and shared resources.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use std::sync::Arc;

use sigil_engine::{Codec, EngineConfig, SessionContext};

use crate::config::AppConfig;
use crate::sessions::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Redis connection manager (auto-reconnecting)
    pub redis: ConnectionManager,

    /// Pattern encoder with the configured transform
    pub codec: Codec,

    /// Live sessions
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    /// Create new application state, connecting to Redis
    pub async fn new(config: AppConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .context("Failed to create Redis client")?;

        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        let codec = config.transform.build_codec()?;
        let sessions = Arc::new(SessionRegistry::new(config.session_ttl_secs));

        Ok(Self {
            config,
            redis,
            codec,
            sessions,
        })
    }

    /// Engine context for a new session; no store attached yet
    pub fn session_context(&self, engine: EngineConfig) -> SessionContext {
        SessionContext::new(engine).with_codec(self.codec.clone())
    }
}
