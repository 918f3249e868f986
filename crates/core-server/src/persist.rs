//! Snapshot persistence.

use crate::ServerCtx;
use tracing::{error, info};

/// Write the committed flatten to the save path verbatim; no trailing
/// newline is added. Runs on every session teardown and on clean shutdown.
pub async fn save_document(ctx: &ServerCtx) {
    let bytes = { ctx.doc.read().await.flatten() };
    match std::fs::write(&ctx.save_path, &bytes) {
        Ok(()) => {
            println!("Document saved to {}", ctx.save_path.display());
            info!(
                target: "server.persist",
                path = %ctx.save_path.display(),
                bytes = bytes.len(),
                "document_saved"
            );
        }
        Err(err) => {
            error!(
                target: "server.persist",
                path = %ctx.save_path.display(),
                %err,
                "document_save_failed"
            );
        }
    }
}
