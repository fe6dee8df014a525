//! Configuration management for sigild.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use sigil_common::constants::{DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL, SESSION_TTL_SECS};
use sigil_engine::{Codec, EngineConfig, PepperedSha256};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Idle sessions are dropped after this many seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pattern engine tunables
    #[serde(default)]
    pub engine: EngineConfig,

    /// Transform applied to pattern digests
    #[serde(default)]
    pub transform: TransformConfig,
}

/// Which transform to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformKind {
    /// Store the bare SHA-1 hex digest
    #[default]
    None,
    /// SHA-256 over a server-side pepper and the digest
    PepperedSha256,
}

/// Digest transform configuration
#[derive(Clone, Default, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub kind: TransformKind,

    /// Required for `peppered-sha256`
    #[serde(default)]
    pub pepper: Option<String>,
}

impl fmt::Debug for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformConfig")
            .field("kind", &self.kind)
            .field("pepper", &self.pepper.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TransformConfig {
    /// Build the codec the engine encodes patterns with
    pub fn build_codec(&self) -> Result<Codec> {
        match self.kind {
            TransformKind::None => Ok(Codec::default()),
            TransformKind::PepperedSha256 => {
                let Some(pepper) = self.pepper.as_deref() else {
                    bail!("transform.pepper is required for peppered-sha256");
                };
                let transform = PepperedSha256::new(pepper).context("Invalid transform pepper")?;
                Ok(Codec::new(Some(Arc::new(transform))))
            }
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_session_ttl() -> u64 { SESSION_TTL_SECS }
fn default_request_timeout() -> u64 { 10 }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref pepper) = args.pepper {
            config.transform.pepper = Some(pepper.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine or transform cannot run with
    pub fn validate(&self) -> Result<()> {
        self.engine
            .validate()
            .context("Invalid engine configuration")?;
        self.transform.build_codec()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            session_ttl_secs: default_session_ttl(),
            request_timeout_secs: default_request_timeout(),
            engine: EngineConfig::default(),
            transform: TransformConfig::default(),
        }
    }
}
