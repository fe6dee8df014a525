//! Deferred display resets.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use sigil_engine::ResetTicket;

use crate::sessions::HostedSession;

/// Fire `ticket` after its delay. A newer gesture makes it a no-op.
pub fn schedule_reset(hosted: Arc<Mutex<HostedSession>>, ticket: ResetTicket) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(ticket.delay).await;
        let mut hosted = hosted.lock().await;
        match hosted.session.fire_reset(ticket) {
            Some(frame) => tracing::debug!(
                generation = ticket.generation,
                display_mode = ?frame.display_mode,
                "Deferred reset applied"
            ),
            None => tracing::trace!(generation = ticket.generation, "Stale reset ignored"),
        }
    })
}
