//! Server runtime: sessions, batched edit scheduling, broadcast fan-out.
//!
//! The original globals (document, client table, command queue, broadcast
//! log) live together in one `ServerCtx` value shared by every task. Lock
//! order, to keep the graph acyclic: sessions → document → queue. The log
//! has its own mutex, taken after the sessions lock and never together with
//! the document lock. The queue mutex is never held across any other lock.

pub mod broadcast;
pub mod persist;
pub mod roles;
pub mod scheduler;
pub mod session;

pub use roles::{RoleLoadError, RoleTable};

use broadcast::BroadcastLog;
use core_document::Document;
use scheduler::QueuedCommand;
use session::SessionTable;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

/// Delay before closing a rejected authentication attempt (rate limit).
pub const AUTH_REJECT_DELAY: Duration = Duration::from_secs(1);

/// Shared state handed to every task at construction time.
pub struct ServerCtx {
    pub doc: RwLock<Document>,
    pub sessions: RwLock<SessionTable>,
    pub queue: Mutex<VecDeque<QueuedCommand>>,
    pub log: Mutex<BroadcastLog>,
    pub roles: RoleTable,
    pub save_path: PathBuf,
}

impl ServerCtx {
    pub fn new(roles: RoleTable, save_path: PathBuf, max_sessions: usize) -> Self {
        Self {
            doc: RwLock::new(Document::new()),
            sessions: RwLock::new(SessionTable::new(max_sessions)),
            queue: Mutex::new(VecDeque::new()),
            log: Mutex::new(BroadcastLog::default()),
            roles,
            save_path,
        }
    }

    /// Queue one raw edit line for the next tick. O(1); FIFO order is the
    /// application order within the batch.
    pub async fn enqueue(&self, username: String, raw: String) {
        trace!(target: "server.queue", user = %username, command = %raw, "enqueued");
        self.queue.lock().await.push_back(QueuedCommand {
            username,
            raw,
            queued_at: Instant::now(),
        });
    }
}
