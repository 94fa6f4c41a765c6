//! Short-lived client-to-SS sessions dispatched off NS redirects (§4.5).
//! Interactive prompting for what to type is the CLI's job (out of
//! scope, §1); these helpers take already-decided edits/timings as
//! arguments so they stay unit-testable against a fake SS.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::protocol::{self, SS_END};

/// `SS_READ`/`SS_STREAM`: read the whole response up to `__SS_END__` and
/// return it as bytes (§4.5 read helper).
pub async fn read_file(endpoint: SocketAddr, filename: &str) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(endpoint).await?;
    stream.write_all(format!("SS_READ;{filename}\n").as_bytes()).await?;
    stream.flush().await?;
    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    protocol::read_until_marker(&mut reader, SS_END).await
}

/// `STREAM`: accumulate the full response, then hand it back already
/// split into whitespace-separated tokens for the caller to emit with a
/// per-token delay (§4.5 stream helper). The delay itself lives here
/// since it is part of the streaming *protocol behavior*, not terminal
/// formatting.
pub async fn stream_file<F>(endpoint: SocketAddr, filename: &str, per_token_delay: Duration, mut on_token: F) -> std::io::Result<()>
where
    F: FnMut(&str),
{
    let bytes = read_file(endpoint, filename).await?;
    let text = String::from_utf8_lossy(&bytes);
    for token in text.split_whitespace() {
        on_token(token);
        tokio::time::sleep(per_token_delay).await;
    }
    Ok(())
}

/// One accepted `WRITE_DATA` edit to apply during a write session.
#[derive(Debug, Clone)]
pub struct WriteEdit {
    pub idx: usize,
    pub content: String,
}

#[derive(Debug)]
pub enum WriteError {
    Io(std::io::Error),
    Rejected(String),
}

impl From<std::io::Error> for WriteError {
    fn from(e: std::io::Error) -> Self {
        WriteError::Io(e)
    }
}

/// `WRITE`: open a fresh connection to the SS, lock the sentence, push
/// each edit awaiting `ACK_DATA`, then `COMMIT_WRITE` and wait for the
/// end marker (§4.5 write helper). The caller is responsible for the
/// follow-up `UPDATE_META` over the NS connection once this returns Ok.
pub async fn write_sentence(
    endpoint: SocketAddr,
    filename: &str,
    sentence: usize,
    edits: &[WriteEdit],
) -> Result<(), WriteError> {
    let mut stream = TcpStream::connect(endpoint).await?;
    stream.set_nodelay(true)?;

    send_line(&mut stream, &format!("SS_LOCK_SENTENCE;{filename};{sentence}")).await?;
    let ack = read_line_raw(&mut stream).await?;
    if ack.trim() != "ACK_LOCK" {
        return Err(WriteError::Rejected(ack.trim().to_string()));
    }

    for edit in edits {
        send_line(&mut stream, &format!("WRITE_DATA;{};{}", edit.idx, edit.content)).await?;
        let ack = read_line_raw(&mut stream).await?;
        if ack.trim() != "ACK_DATA" {
            return Err(WriteError::Rejected(ack.trim().to_string()));
        }
    }

    send_line(&mut stream, "COMMIT_WRITE").await?;
    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let body = protocol::read_until_marker(&mut reader, SS_END).await?;
    let text = String::from_utf8_lossy(&body);
    if text.trim() == "ACK_COMMIT" {
        Ok(())
    } else {
        Err(WriteError::Rejected(text.trim().to_string()))
    }
}

async fn send_line(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    let mut line = line.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes()).await?;
    stream.flush().await
}

/// Read one newline-terminated reply with no end marker (used for
/// `ACK_LOCK`/`ACK_DATA`, which the SS sends without `__SS_END__` so the
/// write session keeps going on the same connection, §4.4).
async fn read_line_raw(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn write_sentence_drives_the_lock_data_commit_sequence() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(&mut socket);
            let mut line = String::new();
            use tokio::io::AsyncBufReadExt;
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, "SS_LOCK_SENTENCE;notes.txt;0\n");
            reader.get_mut().write_all(b"ACK_LOCK\n").await.unwrap();

            line.clear();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, "WRITE_DATA;0;Hello\n");
            reader.get_mut().write_all(b"ACK_DATA\n").await.unwrap();

            line.clear();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, "COMMIT_WRITE\n");
            reader.get_mut().write_all(b"ACK_COMMIT__SS_END__").await.unwrap();
        });

        let edits = vec![WriteEdit { idx: 0, content: "Hello".to_string() }];
        write_sentence(addr, "notes.txt", 0, &edits).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stream_file_emits_whitespace_separated_tokens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"Hello world__SS_END__").await.unwrap();
        });

        let mut tokens = Vec::new();
        stream_file(addr, "notes.txt", Duration::from_millis(0), |t| tokens.push(t.to_string()))
            .await
            .unwrap();
        assert_eq!(tokens, vec!["Hello".to_string(), "world".to_string()]);
        server.await.unwrap();
    }
}
