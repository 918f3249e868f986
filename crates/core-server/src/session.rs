//! Session lifecycle: slot allocation, handshake, authentication, the
//! per-session reader loop, and teardown.
//!
//! The transport is any bidirectional byte stream; the accept loop hands a
//! `TcpStream` in production and tests drive `tokio::io::duplex` pipes. Each
//! session owns two tasks: this reader (queries inline, edits to the queue)
//! and a writer draining the outbound channel, so broadcast fan-out never
//! blocks on a slow client.

use crate::{AUTH_REJECT_DELAY, RoleTable, ServerCtx, persist};
use core_protocol::{self as protocol, Command, Query, frame};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Registry entry for an authenticated session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub username: String,
    pub role: String,
    pub write_access: bool,
    outbound: UnboundedSender<Vec<u8>>,
}

impl SessionHandle {
    pub fn new(
        username: String,
        role: String,
        write_access: bool,
        outbound: UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            username,
            role,
            write_access,
            outbound,
        }
    }

    /// Queue bytes for the session's writer task. Returns `false` once the
    /// writer has died (broken pipe).
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.outbound.send(bytes).is_ok()
    }
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Free,
    /// Handshaking or authenticating; occupies capacity but receives no
    /// broadcasts yet.
    Reserved,
    Active(SessionHandle),
}

/// Fixed-capacity slot table. Allocation and teardown take the write lock;
/// broadcasts and permission snapshots only read.
#[derive(Debug)]
pub struct SessionTable {
    slots: Vec<Slot>,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self { slots }
    }

    /// Claim a free slot, or `None` when every slot is busy.
    pub fn reserve(&mut self) -> Option<usize> {
        let idx = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Free))?;
        self.slots[idx] = Slot::Reserved;
        Some(idx)
    }

    pub fn activate(&mut self, idx: usize, handle: SessionHandle) {
        debug_assert!(matches!(self.slots[idx], Slot::Reserved));
        self.slots[idx] = Slot::Active(handle);
    }

    pub fn release(&mut self, idx: usize) {
        self.slots[idx] = Slot::Free;
    }

    /// Sessions holding a slot, handshaking included.
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !matches!(slot, Slot::Free))
            .count()
    }

    /// Authenticated sessions only.
    pub fn active(&self) -> impl Iterator<Item = (usize, &SessionHandle)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            if let Slot::Active(handle) = slot {
                Some((idx, handle))
            } else {
                None
            }
        })
    }
}

/// Drive one client session from handshake to teardown.
pub async fn run_session<S>(ctx: Arc<ServerCtx>, stream: S)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);

    let slot = ctx.sessions.write().await.reserve();
    let Some(slot) = slot else {
        // Fail closed: one rejection byte, then hang up.
        debug!(target: "server.session", "slots_full_rejecting");
        let _ = write_half
            .write_all(&[protocol::SESSION_REJECT_BYTE])
            .await;
        let _ = write_half.shutdown().await;
        return;
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(write_half, rx));
    let mut lines = BufReader::new(read_half).lines();

    let _ = tx.send(protocol::READY_LINE.as_bytes().to_vec());

    let username = match lines.next_line().await {
        Ok(Some(line)) => line.trim().to_string(),
        _ => {
            debug!(target: "server.session", slot, "handshake_aborted");
            finish(&ctx, slot, tx, writer).await;
            return;
        }
    };

    let Some(role) = ctx.roles.lookup(&username).map(str::to_string) else {
        info!(target: "server.session", user = %username, "auth_rejected");
        let _ = tx.send(protocol::UNAUTHORISED_LINE.as_bytes().to_vec());
        tokio::time::sleep(AUTH_REJECT_DELAY).await;
        finish(&ctx, slot, tx, writer).await;
        return;
    };
    let write_access = RoleTable::write_access(&role);

    // Initial snapshot and activation under the sessions lock (sessions →
    // document order), so no broadcast can slip between the snapshot
    // version and the first frame this session receives.
    {
        let mut sessions = ctx.sessions.write().await;
        let doc = ctx.doc.read().await;
        let _ = tx.send(frame::hello_reply(&role, doc.version(), &doc.flatten()));
        sessions.activate(
            slot,
            SessionHandle::new(username.clone(), role.clone(), write_access, tx.clone()),
        );
    }
    println!("Client connected: {username} ({role})");
    info!(target: "server.session", user = %username, role = %role, slot, "session_active");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(target: "server.session", user = %username, %err, "read_error");
                break;
            }
        };
        let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
        match Command::parse(&line) {
            Ok(Command::Query(query)) => answer_query(&ctx, &tx, &role, query).await,
            Ok(Command::Disconnect) => {
                println!("Client disconnecting: {username}");
                break;
            }
            // Edits and malformed lines alike wait for the tick; parse
            // failures become result lines in the broadcast, not session
            // errors.
            _ => ctx.enqueue(username.clone(), line).await,
        }
    }

    finish(&ctx, slot, tx, writer).await;
    info!(target: "server.session", user = %username, "session_closed");
}

/// Queries reply inline, never through the broadcast path.
async fn answer_query(ctx: &ServerCtx, tx: &UnboundedSender<Vec<u8>>, role: &str, query: Query) {
    match query {
        Query::Doc => {
            let doc = ctx.doc.read().await;
            let _ = tx.send(frame::doc_reply(&doc.flatten()));
        }
        Query::Perm => {
            let _ = tx.send(frame::perm_reply(role).into_bytes());
        }
        Query::Log => {
            let log = ctx.log.lock().await;
            let _ = tx.send(frame::log_reply(log.as_str()).into_bytes());
        }
    }
}

/// Teardown from any state: free the slot, let the writer drain and close
/// the stream, persist the document.
async fn finish(
    ctx: &ServerCtx,
    slot: usize,
    tx: UnboundedSender<Vec<u8>>,
    writer: JoinHandle<()>,
) {
    ctx.sessions.write().await.release(slot);
    drop(tx);
    let _ = writer.await;
    persist::save_document(ctx).await;
}

async fn write_loop<W>(mut writer: W, mut rx: UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        if writer.write_all(&chunk).await.is_err() || writer.flush().await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}
