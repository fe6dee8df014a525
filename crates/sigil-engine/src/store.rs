//! Secret storage seam.
//!
//! The engine never persists anything itself. A host injects a store scoped
//! to one named secret; create flows save through it and compare flows may
//! load the expected secret from it.

use std::sync::{Arc, Mutex};

use sigil_common::{EncodedSecret, Result, SigilError};

/// Key-value access to a single named secret
pub trait SecretStore: Send {
    fn load(&self) -> Result<Option<EncodedSecret>>;
    fn save(&mut self, secret: &EncodedSecret) -> Result<()>;
}

/// In-process store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<EncodedSecret>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: EncodedSecret) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(secret))),
        }
    }
}

impl SecretStore for MemoryStore {
    fn load(&self) -> Result<Option<EncodedSecret>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| SigilError::Store("Memory store poisoned".to_string()))?;
        Ok(slot.clone())
    }

    fn save(&mut self, secret: &EncodedSecret) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| SigilError::Store("Memory store poisoned".to_string()))?;
        *slot = Some(secret.clone());
        Ok(())
    }
}
