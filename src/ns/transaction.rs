//! NS-to-SS transaction helper (§4.3): a one-shot connection that writes
//! a single command and reads until `__SS_END__`. Used by every
//! NS-mediated verb. Runs outside any catalog lock — callers copy the
//! endpoint they need out of the registry first (§4.2, §5).

use std::net::SocketAddr;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::protocol::{self, SS_END};

#[derive(Debug)]
pub struct SsReply {
    pub body: Vec<u8>,
}

impl SsReply {
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// True if the reply's first token (up to `;` or end) equals `ack`.
    pub fn has_ack(&self, ack: &str) -> bool {
        let text = self.as_text();
        let text = text.trim();
        text == ack || text.starts_with(&format!("{ack};")) || text.starts_with(&format!("{ack}\n"))
    }

    pub fn is_error(&self) -> bool {
        self.as_text().trim_start().starts_with("ERROR")
    }
}

/// Open a connection to `endpoint`, send `command` (a bare `VERB;args`
/// line, newline appended if missing), and read the reply up to and
/// including `__SS_END__`, which is stripped. Any socket error surfaces
/// as `Err` with a human-readable reason (§4.3).
pub async fn call(endpoint: SocketAddr, command: &str) -> Result<SsReply, String> {
    let mut stream = TcpStream::connect(endpoint)
        .await
        .map_err(|e| format!("could not connect to storage server {endpoint}: {e}"))?;
    stream.set_nodelay(true).map_err(|e| e.to_string())?;

    let mut line = command.to_string();
    if !line.ends_with('\n') {
        line.push('\n');
    }
    stream.write_all(line.as_bytes()).await.map_err(|e| format!("write to {endpoint} failed: {e}"))?;
    stream.flush().await.map_err(|e| e.to_string())?;

    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let body = protocol::read_until_marker(&mut reader, SS_END)
        .await
        .map_err(|e| format!("read from {endpoint} failed: {e}"))?;
    Ok(SsReply { body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn call_round_trips_through_a_fake_storage_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"SS_CREATE;notes.txt\n");
            socket.write_all(b"ACK_CREATE__SS_END__").await.unwrap();
        });

        let reply = call(addr, "SS_CREATE;notes.txt").await.unwrap();
        assert!(reply.has_ack("ACK_CREATE"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn call_reports_connection_failure() {
        // Nothing listens on this port; the OS should refuse immediately.
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = call(addr, "SS_CREATE;x").await;
        assert!(result.is_err());
    }
}
