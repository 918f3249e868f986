//! Frame fan-out and the append-only broadcast log.

use crate::ServerCtx;
use core_protocol::BroadcastFrame;
use tracing::{debug, warn};

/// Every broadcast frame ever sent, verbatim; `LOG?` serves it in full.
#[derive(Debug, Default)]
pub struct BroadcastLog {
    text: String,
}

impl BroadcastLog {
    pub fn append(&mut self, frame: &str) {
        self.text.push_str(frame);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Serialise `frame`, append it to the log, and push it to every active
/// session under the sessions read lock. Delivery goes through per-session
/// outbound queues, so a slow or dead client never stalls the tick; a dead
/// session is skipped here and torn down by its own tasks.
pub async fn publish(ctx: &ServerCtx, frame: &BroadcastFrame) {
    let text = frame.render();
    let sessions = ctx.sessions.read().await;
    ctx.log.lock().await.append(&text);
    let mut delivered = 0usize;
    for (slot, handle) in sessions.active() {
        if handle.send(text.clone().into_bytes()) {
            delivered += 1;
        } else {
            warn!(
                target: "server.broadcast",
                slot,
                user = %handle.username,
                "dead_session_skipped"
            );
        }
    }
    debug!(
        target: "server.broadcast",
        version = frame.version,
        sessions = delivered,
        "broadcast_sent"
    );
}
