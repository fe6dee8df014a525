//! Live session registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use sigil_common::{Frame, Outcome, SigilError};
use sigil_engine::{PointerEvent, RecognizerEvent, ResetTicket, Session};

use crate::secrets::SecretSlot;

/// A session plus what the host keeps next to it
#[derive(Debug)]
pub struct HostedSession {
    pub session: Session,
    /// Redis-backed secret, for create and compare-by-name sessions
    pub slot: Option<SecretSlot>,
    last_seen: i64,
}

/// Everything a batch of pointer events produced
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub events: Vec<RecognizerEvent>,
    pub outcomes: Vec<Outcome>,
    pub frame: Frame,
    /// Reset still pending after the whole batch
    pub reset: Option<ResetTicket>,
    /// Trailing events dropped after the session closed or an event failed
    pub ignored: usize,
    /// Failure that stopped the batch after some events were applied
    pub rejected: Option<SigilError>,
}

impl HostedSession {
    pub fn new(session: Session, slot: Option<SecretSlot>) -> Self {
        Self {
            session,
            slot,
            last_seen: chrono::Utc::now().timestamp(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = chrono::Utc::now().timestamp();
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen
    }

    /// Feed events in order until the session closes.
    ///
    /// Only a failure on the first event is an error. A later failure stops
    /// the batch but keeps what the earlier events produced.
    pub fn apply(&mut self, events: &[PointerEvent]) -> Result<EventBatch, SigilError> {
        self.touch();

        let mut produced = Vec::new();
        let mut outcomes = Vec::new();
        let mut ignored = 0;
        let mut rejected = None;
        for (index, event) in events.iter().enumerate() {
            if index > 0 && self.session.is_closed() {
                ignored = events.len() - index;
                break;
            }
            match self.session.handle(*event) {
                Ok(update) => {
                    produced.extend(update.events);
                    outcomes.extend(update.outcome);
                }
                Err(err) if index == 0 => return Err(err),
                Err(err) => {
                    ignored = events.len() - index;
                    rejected = Some(err);
                    break;
                }
            }
        }

        Ok(EventBatch {
            events: produced,
            outcomes,
            frame: self.session.frame(),
            reset: self.session.pending_reset(),
            ignored,
            rejected,
        })
    }
}

/// Sessions by id, each behind its own lock
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<HostedSession>>>>,
    ttl_secs: u64,
}

impl SessionRegistry {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    /// Register a session under a fresh id
    pub async fn insert(&self, hosted: HostedSession) -> (String, Arc<Mutex<HostedSession>>) {
        let id = generate_session_id();
        let hosted = Arc::new(Mutex::new(hosted));
        self.sessions
            .write()
            .await
            .insert(id.clone(), hosted.clone());
        (id, hosted)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<HostedSession>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle since before `now - ttl`. Busy sessions are skipped.
    pub async fn reap_idle(&self, now: i64) -> usize {
        let cutoff = now - self.ttl_secs as i64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, hosted| match hosted.try_lock() {
            Ok(guard) => guard.last_seen() >= cutoff,
            Err(_) => true,
        });
        before - sessions.len()
    }
}

/// Background task dropping idle sessions
pub async fn session_reaper(
    registry: Arc<SessionRegistry>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(ttl_secs = registry.ttl_secs, "Session reaper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(30)) => {
                let reaped = registry.reap_idle(chrono::Utc::now().timestamp()).await;
                if reaped > 0 {
                    tracing::debug!(reaped, "Idle sessions dropped");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Session reaper shutting down");
                break;
            }
        }
    }
}

/// Generate a cryptographically random session ID
fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
