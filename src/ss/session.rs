//! Per-connection storage-server protocol handling: the stateless
//! one-shot commands (`SS_CREATE`, `SS_READ`, ...) and the stateful
//! write session state machine `IDLE -> LOCKED -> IDLE` (§4.4).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::protocol::{self, Frame, SS_END};

use super::engine::{FileEngine, WordEdit};

/// State of the write session on this connection. A connection starts
/// `Idle` and returns to it after `COMMIT_WRITE`; a disconnect at any
/// point discards whatever was buffered (§4.4 state machine).
enum WriteState {
    Idle,
    Locked { filename: String, sentence: usize, edits: Vec<WordEdit> },
}

pub async fn handle_connection(
    socket: TcpStream,
    engine: Arc<FileEngine>,
    peer: SocketAddr,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut state = WriteState::Idle;

    loop {
        let line = match protocol::read_line(&mut reader).await? {
            Some(l) => l,
            None => return Ok(()),
        };
        let Some(frame) = Frame::parse(&line) else { continue };
        tracing::debug!(%peer, verb = %frame.verb, "ss command");

        match frame.verb.as_str() {
            "SS_LOCK_SENTENCE" => {
                let (Some(filename), Some(n)) = (frame.arg(0), frame.arg(1).and_then(|s| s.parse::<usize>().ok()))
                else {
                    write_half.write_all(b"ERROR;invalid SS_LOCK_SENTENCE args\n").await?;
                    continue;
                };
                state = WriteState::Locked { filename: filename.to_string(), sentence: n, edits: Vec::new() };
                write_half.write_all(b"ACK_LOCK\n").await?;
            }
            "WRITE_DATA" => {
                let WriteState::Locked { edits, .. } = &mut state else {
                    write_half.write_all(b"ERROR;no sentence is locked on this connection\n").await?;
                    continue;
                };
                let Some(idx) = frame.arg(0).and_then(|s| s.parse::<usize>().ok()) else {
                    write_half.write_all(b"ERROR;invalid WRITE_DATA index\n").await?;
                    continue;
                };
                let content = frame.args.get(1..).map(|rest| rest.join(";")).unwrap_or_default();
                edits.push(WordEdit { idx, content });
                write_half.write_all(b"ACK_DATA\n").await?;
            }
            "COMMIT_WRITE" => {
                let WriteState::Locked { filename, sentence, edits } =
                    std::mem::replace(&mut state, WriteState::Idle)
                else {
                    write_half.write_all(b"ERROR;no sentence is locked on this connection\n").await?;
                    continue;
                };
                match engine.commit(&filename, sentence, &edits).await {
                    Ok(()) => write_half.write_all(format!("ACK_COMMIT{SS_END}").as_bytes()).await?,
                    Err(e) => {
                        write_half.write_all(format!("ERROR;{e}{SS_END}").as_bytes()).await?;
                    }
                }
            }
            "SS_CREATE" => {
                let Some(filename) = frame.arg(0) else { continue };
                respond(&mut write_half, engine.create(filename).await.map(|()| "ACK_CREATE".to_string())).await?;
            }
            "SS_DELETE" => {
                let Some(filename) = frame.arg(0) else { continue };
                respond(&mut write_half, engine.delete(filename).await.map(|()| "ACK_DELETE".to_string())).await?;
            }
            "SS_UNDO" => {
                let Some(filename) = frame.arg(0) else { continue };
                respond(&mut write_half, engine.undo(filename).await.map(|()| "ACK_UNDO".to_string())).await?;
            }
            "SS_CHECKPOINT" => {
                let (Some(filename), Some(tag)) = (frame.arg(0), frame.arg(1)) else { continue };
                respond(
                    &mut write_half,
                    engine.checkpoint(filename, tag).await.map(|()| "ACK_CHECKPOINT".to_string()),
                )
                .await?;
            }
            "SS_REVERT" => {
                let (Some(filename), Some(tag)) = (frame.arg(0), frame.arg(1)) else { continue };
                respond(&mut write_half, engine.revert(filename, tag).await.map(|()| "ACK_REVERT".to_string())).await?;
            }
            "SS_VIEWCHECKPOINT" => {
                let (Some(filename), Some(tag)) = (frame.arg(0), frame.arg(1)) else { continue };
                match engine.view_checkpoint(filename, tag).await {
                    Ok(bytes) => {
                        write_half.write_all(&bytes).await?;
                        write_half.write_all(SS_END.as_bytes()).await?;
                    }
                    Err(e) => write_half.write_all(format!("ERROR;{e}{SS_END}").as_bytes()).await?,
                }
            }
            "SS_READ" | "SS_STREAM" | "SS_EXEC" => {
                let Some(filename) = frame.arg(0) else { continue };
                match engine.read_bytes(filename).await {
                    Ok(bytes) => {
                        write_half.write_all(&bytes).await?;
                        write_half.write_all(SS_END.as_bytes()).await?;
                    }
                    Err(e) => write_half.write_all(format!("ERROR;{e}{SS_END}").as_bytes()).await?,
                }
            }
            other => {
                tracing::warn!(%peer, verb = other, "unknown ss command, closing connection");
                write_half.write_all(format!("ERROR;unknown command{SS_END}").as_bytes()).await?;
                return Ok(());
            }
        }
        write_half.flush().await?;
    }
}

async fn respond<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    result: Result<String, crate::error::SsError>,
) -> std::io::Result<()> {
    match result {
        Ok(ack) => writer.write_all(format!("{ack}{SS_END}").as_bytes()).await,
        Err(e) => writer.write_all(format!("ERROR;{e}{SS_END}").as_bytes()).await,
    }
}
