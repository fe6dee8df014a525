//! Named secrets in Redis.
//!
//! The engine's `SecretStore` is synchronous, so a session gets a
//! [`SecretSlot`]: loaded from Redis before the session starts, written by
//! the engine in memory, and flushed back once the session reports success.

use anyhow::{Context, Result};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::{Arc, Mutex, MutexGuard};

use sigil_common::constants::redis_keys::SECRET_PREFIX;
use sigil_common::{EncodedSecret, SigilError};
use sigil_engine::SecretStore;

const MAX_NAME_LEN: usize = 64;

/// Redis key for a named secret
pub fn secret_key(name: &str) -> String {
    format!("{}{}", SECRET_PREFIX, name)
}

/// Names are short and limited to `[A-Za-z0-9._-]`
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

pub async fn load_secret(redis: &mut ConnectionManager, name: &str) -> Result<Option<EncodedSecret>> {
    let value: Option<Vec<u8>> = redis
        .get(secret_key(name))
        .await
        .with_context(|| format!("Failed to read secret {}", name))?;
    Ok(value.map(EncodedSecret::new))
}

pub async fn save_secret(
    redis: &mut ConnectionManager,
    name: &str,
    secret: &EncodedSecret,
) -> Result<()> {
    let _: () = redis
        .set(secret_key(name), secret.as_bytes())
        .await
        .with_context(|| format!("Failed to write secret {}", name))?;
    tracing::info!(name = %name, "Secret stored");
    Ok(())
}

#[derive(Debug, Default)]
struct SlotState {
    value: Option<EncodedSecret>,
    dirty: bool,
}

/// Write-through cache of one named secret. Clones share state.
#[derive(Debug, Clone)]
pub struct SecretSlot {
    name: String,
    state: Arc<Mutex<SlotState>>,
}

impl SecretSlot {
    pub fn new(name: impl Into<String>, value: Option<EncodedSecret>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(SlotState {
                value,
                dirty: false,
            })),
        }
    }

    /// The value saved since the last call, if any
    pub fn take_dirty(&self) -> sigil_common::Result<Option<EncodedSecret>> {
        let mut state = self.lock()?;
        if !state.dirty {
            return Ok(None);
        }
        state.dirty = false;
        Ok(state.value.clone())
    }

    /// Write a pending save to Redis. Returns whether anything was written.
    pub async fn flush(&self, redis: &mut ConnectionManager) -> Result<bool> {
        match self.take_dirty()? {
            Some(secret) => {
                save_secret(redis, &self.name, &secret).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn lock(&self) -> sigil_common::Result<MutexGuard<'_, SlotState>> {
        self.state
            .lock()
            .map_err(|_| SigilError::Store(format!("Secret slot {} poisoned", self.name)))
    }
}

impl SecretStore for SecretSlot {
    fn load(&self) -> sigil_common::Result<Option<EncodedSecret>> {
        Ok(self.lock()?.value.clone())
    }

    fn save(&mut self, secret: &EncodedSecret) -> sigil_common::Result<()> {
        let mut state = self.lock()?;
        state.value = Some(secret.clone());
        state.dirty = true;
        Ok(())
    }
}
