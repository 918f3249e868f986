//! markd entrypoint: CLI, logging bootstrap, TCP accept loop, and the
//! operator console on stdin.

use anyhow::{Context, Result, bail};
use clap::Parser;
use core_server::{RoleTable, ServerCtx, persist, scheduler, session};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "markd", version, about = "Collaborative markdown editing server")]
struct Args {
    /// Batch tick interval in milliseconds (positive integer).
    tick_ms: u64,
    /// Configuration file path (overrides discovery of `markd.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address override.
    #[arg(long)]
    listen: Option<String>,
    /// Role table path override.
    #[arg(long)]
    roles: Option<PathBuf>,
    /// Save path override.
    #[arg(long)]
    save: Option<PathBuf>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("markd.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "markd.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => {
            // Global subscriber already installed; drop the guard so the
            // writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.tick_ms == 0 {
        bail!("tick interval must be a positive number of milliseconds");
    }
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", tick_ms = args.tick_ms, "startup");

    let config = core_config::load_from(args.config.clone())?;
    let listen = args
        .listen
        .clone()
        .unwrap_or_else(|| config.file.server.listen.clone());
    let roles_path = args
        .roles
        .clone()
        .unwrap_or_else(|| config.file.files.roles.clone());
    let save_path = args
        .save
        .clone()
        .unwrap_or_else(|| config.file.files.save.clone());

    let roles = RoleTable::load(&roles_path)
        .with_context(|| format!("loading role table {}", roles_path.display()))?;
    let ctx = Arc::new(ServerCtx::new(
        roles,
        save_path,
        config.file.server.max_sessions,
    ));

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    println!("Server listening on {}", listener.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler::run(
        ctx.clone(),
        Duration::from_millis(args.tick_ms),
        shutdown_rx.clone(),
    ));
    let accept_task = tokio::spawn(accept_loop(ctx.clone(), listener, shutdown_rx));

    let quit = console_loop(&ctx, &shutdown_tx).await;
    if !quit {
        // stdin closed without QUIT; keep serving until interrupted.
        info!(target: "runtime", "console_closed_waiting_for_interrupt");
        let _ = tokio::signal::ctrl_c().await;
        println!("Shutting down server...");
        let _ = shutdown_tx.send(true);
    }

    let _ = scheduler_task.await;
    let _ = accept_task.await;
    persist::save_document(&ctx).await;
    info!(target: "runtime.shutdown", "complete");
    Ok(())
}

async fn accept_loop(
    ctx: Arc<ServerCtx>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(target: "server.accept", %peer, "client_hello");
                    tokio::spawn(session::run_session(ctx.clone(), stream));
                }
                Err(err) => {
                    warn!(target: "server.accept", %err, "accept_error");
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Operator console: `QUIT` (refused while sessions remain), `DOC?`, `LOG?`.
/// Returns true when a QUIT was accepted.
async fn console_loop(ctx: &ServerCtx, shutdown: &watch::Sender<bool>) -> bool {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "QUIT" => {
                let connected = ctx.sessions.read().await.occupied();
                if connected == 0 {
                    println!("Shutting down server...");
                    let _ = shutdown.send(true);
                    return true;
                }
                println!("QUIT rejected, {connected} clients still connected.");
            }
            "DOC?" => {
                let doc = ctx.doc.read().await;
                println!("DOC?");
                println!("{}", String::from_utf8_lossy(&doc.flatten()));
            }
            "LOG?" => {
                let log = ctx.log.lock().await;
                print!("LOG?\n{}", log.as_str());
                use std::io::Write as _;
                let _ = std::io::stdout().flush();
            }
            _ => {}
        }
    }
    false
}
