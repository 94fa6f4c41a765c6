//! Storage server: one TCP listener rooted at a single directory, serving
//! both client-direct (read/write/stream) and NS-mediated
//! (create/delete/undo/checkpoint/exec/meta-fetch) connections (§4.4).

pub mod engine;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use engine::FileEngine;

/// Accept connections forever, spawning one task per connection exactly
/// as the name server does (§5: one logical flow of control per
/// connection, cooperating through shared mutexes — here, the single
/// file-system mutex in [`FileEngine`]).
pub async fn serve(listener: TcpListener, root: PathBuf) -> std::io::Result<()> {
    let engine = Arc::new(FileEngine::new(root));
    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true)?;
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if let Err(e) = session::handle_connection(socket, engine, peer).await {
                tracing::warn!(%peer, error = %e, "storage server connection ended with an error");
            }
        });
    }
}

/// Directory listing used when a storage server registers with the name
/// server: the set of plain files (not `.bak`/`.tmp`/checkpoint siblings)
/// currently on disk (§3, SPEC_FULL §E.2 SS registration file-discovery).
pub async fn known_files(root: &PathBuf) -> std::io::Result<std::collections::BTreeSet<String>> {
    let mut out = std::collections::BTreeSet::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".bak") || name.ends_with(".tmp") || name.contains(".ckpt.") {
            continue;
        }
        out.insert(name);
    }
    Ok(out)
}
