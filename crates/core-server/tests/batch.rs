//! Batch application tests: the scheduler's drain-and-apply path driven
//! directly, without any transport.

use core_protocol::CommandResult;
use core_server::session::SessionHandle;
use core_server::{RoleTable, ServerCtx, broadcast, scheduler};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

fn test_ctx() -> (Arc<ServerCtx>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let roles = RoleTable::from_pairs([
        ("alice", "write"),
        ("bob", "read"),
        ("carol", "write"),
    ]);
    let ctx = Arc::new(ServerCtx::new(roles, dir.path().join("doc.md"), 8));
    (ctx, dir)
}

/// Register an authenticated session without a transport; the returned
/// receiver stands in for the writer task.
async fn connect(ctx: &ServerCtx, username: &str) -> UnboundedReceiver<Vec<u8>> {
    let role = ctx.roles.lookup(username).expect("test user in table");
    let write_access = RoleTable::write_access(role);
    let (tx, rx) = mpsc::unbounded_channel();
    let mut sessions = ctx.sessions.write().await;
    let slot = sessions.reserve().expect("slot available");
    sessions.activate(
        slot,
        SessionHandle::new(username.to_string(), role.to_string(), write_access, tx),
    );
    rx
}

async fn doc_text(ctx: &ServerCtx) -> String {
    String::from_utf8(ctx.doc.read().await.flatten()).unwrap()
}

#[tokio::test]
async fn empty_tick_emits_nothing() {
    let (ctx, _dir) = test_ctx();
    assert!(scheduler::run_tick(&ctx).await.is_none());
    assert_eq!(ctx.doc.read().await.version(), 0);
    assert!(ctx.log.lock().await.is_empty());
}

#[tokio::test]
async fn same_tick_inserts_apply_in_arrival_order() {
    let (ctx, _dir) = test_ctx();
    let _alice = connect(&ctx, "alice").await;
    let _carol = connect(&ctx, "carol").await;
    ctx.enqueue("alice".into(), "INSERT 0 Hi".into()).await;
    ctx.enqueue("carol".into(), "INSERT 0 Yo".into()).await;

    let frame = scheduler::run_tick(&ctx).await.expect("non-empty batch");
    assert_eq!(frame.version, 1);
    assert_eq!(frame.entries.len(), 2);
    assert_eq!(frame.entries[0].username, "alice");
    assert_eq!(frame.entries[1].username, "carol");
    assert!(frame
        .entries
        .iter()
        .all(|e| e.result == CommandResult::Success));
    assert_eq!(doc_text(&ctx).await, "HiYo");
}

#[tokio::test]
async fn read_only_user_edit_is_rejected_unauthorised() {
    let (ctx, _dir) = test_ctx();
    let _alice = connect(&ctx, "alice").await;
    let _bob = connect(&ctx, "bob").await;
    ctx.enqueue("bob".into(), "BOLD 0 5".into()).await;

    let frame = scheduler::run_tick(&ctx).await.unwrap();
    assert_eq!(frame.entries.len(), 1);
    assert_eq!(frame.entries[0].result, CommandResult::Unauthorised);
    assert_eq!(
        frame.render(),
        "VERSION 1\nEDIT bob BOLD 0 5 Reject UNAUTHORISED\nEND\n"
    );
    assert_eq!(doc_text(&ctx).await, "", "document must be unchanged");
}

#[tokio::test]
async fn read_only_user_is_gated_before_argument_parsing() {
    let (ctx, _dir) = test_ctx();
    let _bob = connect(&ctx, "bob").await;
    ctx.enqueue("bob".into(), "BOLD nonsense".into()).await;
    let frame = scheduler::run_tick(&ctx).await.unwrap();
    assert_eq!(frame.entries[0].result, CommandResult::Unauthorised);
}

#[tokio::test]
async fn malformed_lines_reject_invalid_position() {
    let (ctx, _dir) = test_ctx();
    let _alice = connect(&ctx, "alice").await;
    ctx.enqueue("alice".into(), "SHOUT 1".into()).await;
    ctx.enqueue("alice".into(), "DEL 6".into()).await;
    let frame = scheduler::run_tick(&ctx).await.unwrap();
    assert!(frame
        .entries
        .iter()
        .all(|e| e.result == CommandResult::InvalidPosition));
    assert_eq!(frame.version, 1, "rejected-only batches still commit");
}

#[tokio::test]
async fn unknown_user_edit_is_rejected_unauthorised() {
    let (ctx, _dir) = test_ctx();
    ctx.enqueue("mallory".into(), "INSERT 0 hi".into()).await;
    let frame = scheduler::run_tick(&ctx).await.unwrap();
    assert_eq!(frame.entries[0].result, CommandResult::Unauthorised);
    assert_eq!(doc_text(&ctx).await, "");
}

#[tokio::test]
async fn batch_commands_share_the_pre_commit_version() {
    let (ctx, _dir) = test_ctx();
    let _alice = connect(&ctx, "alice").await;
    // The bold range refers to text the same batch just inserted.
    ctx.enqueue("alice".into(), "INSERT 0 hello".into()).await;
    ctx.enqueue("alice".into(), "BOLD 0 5".into()).await;
    let frame = scheduler::run_tick(&ctx).await.unwrap();
    assert!(frame
        .entries
        .iter()
        .all(|e| e.result == CommandResult::Success));
    assert_eq!(doc_text(&ctx).await, "**hello**");
}

#[tokio::test]
async fn version_increments_once_per_non_empty_tick() {
    let (ctx, _dir) = test_ctx();
    let _alice = connect(&ctx, "alice").await;
    ctx.enqueue("alice".into(), "INSERT 0 one".into()).await;
    assert_eq!(scheduler::run_tick(&ctx).await.unwrap().version, 1);
    assert!(scheduler::run_tick(&ctx).await.is_none());
    ctx.enqueue("alice".into(), "INSERT 3 two".into()).await;
    assert_eq!(scheduler::run_tick(&ctx).await.unwrap().version, 2);
    assert_eq!(doc_text(&ctx).await, "onetwo");
}

#[tokio::test]
async fn out_of_range_edit_rejected_without_side_effects() {
    let (ctx, _dir) = test_ctx();
    let _alice = connect(&ctx, "alice").await;
    ctx.enqueue("alice".into(), "DEL 0 10".into()).await;
    ctx.enqueue("alice".into(), "INSERT 0 ok".into()).await;
    let frame = scheduler::run_tick(&ctx).await.unwrap();
    assert_eq!(frame.entries[0].result, CommandResult::InvalidPosition);
    assert_eq!(frame.entries[1].result, CommandResult::Success);
    assert_eq!(doc_text(&ctx).await, "ok");
}

#[tokio::test]
async fn markdown_commands_compose_over_ticks() {
    let (ctx, _dir) = test_ctx();
    let _alice = connect(&ctx, "alice").await;
    ctx.enqueue("alice".into(), "HEADING 2 0".into()).await;
    scheduler::run_tick(&ctx).await.unwrap();
    assert_eq!(doc_text(&ctx).await, "## ");
    ctx.enqueue("alice".into(), "INSERT 3 Title".into()).await;
    scheduler::run_tick(&ctx).await.unwrap();
    assert_eq!(doc_text(&ctx).await, "## Title");
}

#[tokio::test]
async fn repeated_ordered_list_renumbers_within_one_tick() {
    let (ctx, _dir) = test_ctx();
    let _alice = connect(&ctx, "alice").await;
    for _ in 0..3 {
        ctx.enqueue("alice".into(), "ORDERED_LIST 0".into()).await;
    }
    let frame = scheduler::run_tick(&ctx).await.unwrap();
    assert!(frame
        .entries
        .iter()
        .all(|e| e.result == CommandResult::Success));
    assert_eq!(doc_text(&ctx).await, "1. \n2. \n3. ");
}

#[tokio::test]
async fn publish_appends_log_and_delivers_to_active_sessions() {
    let (ctx, _dir) = test_ctx();
    let mut alice = connect(&ctx, "alice").await;
    let mut bob = connect(&ctx, "bob").await;
    ctx.enqueue("alice".into(), "INSERT 0 Hi".into()).await;
    let frame = scheduler::run_tick(&ctx).await.unwrap();
    broadcast::publish(&ctx, &frame).await;

    let expected = frame.render();
    assert_eq!(alice.recv().await.unwrap(), expected.as_bytes());
    assert_eq!(bob.recv().await.unwrap(), expected.as_bytes());
    assert_eq!(ctx.log.lock().await.as_str(), expected);

    // A second tick appends, preserving broadcast order in the log.
    ctx.enqueue("alice".into(), "INSERT 2 !".into()).await;
    let second = scheduler::run_tick(&ctx).await.unwrap();
    broadcast::publish(&ctx, &second).await;
    let log = ctx.log.lock().await;
    assert!(log.as_str().starts_with(&expected));
    assert!(log.as_str().contains("VERSION 2"));
}

#[tokio::test]
async fn dead_session_does_not_block_publish() {
    let (ctx, _dir) = test_ctx();
    let alice = connect(&ctx, "alice").await;
    drop(alice); // writer gone
    let mut bob = connect(&ctx, "bob").await;
    ctx.enqueue("alice".into(), "INSERT 0 Hi".into()).await;
    let frame = scheduler::run_tick(&ctx).await.unwrap();
    broadcast::publish(&ctx, &frame).await;
    assert_eq!(bob.recv().await.unwrap(), frame.render().as_bytes());
}
