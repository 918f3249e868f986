//! Tick-driven batch scheduler.
//!
//! Every `tick` the queue is swapped out under its own mutex and the whole
//! batch is applied under a single document write lock, in strict FIFO
//! order, each command targeting the document's live version. One commit
//! per non-empty batch bumps the version, even when every command was
//! rejected, so the version doubles as a tick counter clients can order
//! broadcasts by. Empty ticks emit nothing.

use crate::{ServerCtx, broadcast};
use core_document::{Document, EditError, EditResult};
use core_protocol::{
    BroadcastFrame, Command, CommandResult, EditCommand, EditRecord, is_edit_keyword,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// One raw edit line awaiting the next tick.
#[derive(Debug)]
pub struct QueuedCommand {
    pub username: String,
    pub raw: String,
    pub queued_at: Instant,
}

/// Periodic tick loop; runs until shutdown is signalled.
pub async fn run(ctx: Arc<ServerCtx>, tick: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(
        target: "server.scheduler",
        tick_ms = tick.as_millis() as u64,
        "scheduler_started"
    );
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately; the contract
    // is one full period before the first drain.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(frame) = run_tick(&ctx).await {
                    broadcast::publish(&ctx, &frame).await;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(target: "server.scheduler", "scheduler_stopped");
}

/// Drain the queue and apply one batch. Returns the frame to broadcast, or
/// `None` for an empty tick.
pub async fn run_tick(ctx: &ServerCtx) -> Option<BroadcastFrame> {
    let batch: Vec<QueuedCommand> = {
        let mut queue = ctx.queue.lock().await;
        queue.drain(..).collect()
    };
    if batch.is_empty() {
        return None;
    }

    // Permission snapshot before the document lock, honouring the
    // sessions → document order. A user who disconnected since enqueueing
    // is absent and their edits reject UNAUTHORISED.
    let write_access: HashMap<String, bool> = {
        let sessions = ctx.sessions.read().await;
        sessions
            .active()
            .map(|(_, handle)| (handle.username.clone(), handle.write_access))
            .collect()
    };

    let mut doc = ctx.doc.write().await;
    let mut entries = Vec::with_capacity(batch.len());
    for cmd in batch {
        let result = apply_command(&mut doc, &write_access, &cmd);
        trace!(
            target: "server.scheduler",
            user = %cmd.username,
            command = %cmd.raw,
            result = %result,
            "applied"
        );
        entries.push(EditRecord {
            username: cmd.username,
            command: cmd.raw,
            result,
        });
    }
    let version = doc.commit();
    debug!(
        target: "server.scheduler",
        version,
        commands = entries.len(),
        "batch_committed"
    );
    Some(BroadcastFrame { version, entries })
}

fn apply_command(
    doc: &mut Document,
    write_access: &HashMap<String, bool>,
    cmd: &QueuedCommand,
) -> CommandResult {
    // The permission gate looks at the keyword alone, so a read-only user
    // is rejected UNAUTHORISED even for a malformed edit line.
    let keyword = cmd.raw.split_whitespace().next().unwrap_or("");
    if is_edit_keyword(keyword) && !write_access.get(&cmd.username).copied().unwrap_or(false) {
        return CommandResult::Unauthorised;
    }
    let edit = match Command::parse(&cmd.raw) {
        Ok(Command::Edit(edit)) => edit,
        // Queries and DISCONNECT are answered inline by sessions and never
        // reach the queue; anything else here is malformed.
        _ => return CommandResult::InvalidPosition,
    };
    let version = doc.version();
    match dispatch(doc, version, &edit) {
        Ok(()) => CommandResult::Success,
        Err(EditError::InvalidPosition) => CommandResult::InvalidPosition,
        Err(EditError::DeletedPosition) => CommandResult::DeletedPosition,
        Err(EditError::OutdatedVersion) => CommandResult::OutdatedVersion,
    }
}

/// Every command in a batch targets the same pre-commit version.
fn dispatch(doc: &mut Document, version: u64, edit: &EditCommand) -> EditResult {
    match edit {
        EditCommand::Insert { pos, text } => doc.insert(version, *pos, text),
        EditCommand::Delete { pos, len } => doc.delete(version, *pos, *len),
        EditCommand::Newline { pos } => doc.newline(version, *pos),
        EditCommand::Heading { level, pos } => doc.heading(version, *level, *pos),
        EditCommand::Bold { start, end } => doc.bold(version, *start, *end),
        EditCommand::Italic { start, end } => doc.italic(version, *start, *end),
        EditCommand::Code { start, end } => doc.code(version, *start, *end),
        EditCommand::Blockquote { pos } => doc.blockquote(version, *pos),
        EditCommand::OrderedList { pos } => doc.ordered_list(version, *pos),
        EditCommand::UnorderedList { pos } => doc.unordered_list(version, *pos),
        EditCommand::HorizontalRule { pos } => doc.horizontal_rule(version, *pos),
        EditCommand::Link { start, end, url } => doc.link(version, *start, *end, url),
    }
}
