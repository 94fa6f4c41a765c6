//! Interactive client session: one persistent NS connection plus
//! short-lived SS connections dispatched off NS's `REDIRECT_*` replies
//! (§4.5). The CLI input parser and terminal formatting are out of
//! scope (§1) — this module only implements the session driver and SS
//! helpers; a thin binary glues it to stdin (`src/bin/client.rs`).

pub mod ss_helpers;

use std::net::SocketAddr;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::protocol::{self, NS_END};

/// The persistent connection to the name server. Requests are
/// serialized one at a time: `send` writes a command line, then reads
/// until `__END__` before the caller sends the next one (§4.1: "never
/// pipelined").
pub struct NsSession {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

/// The parsed shape of an NS reply, discriminated on its first token
/// (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NsReply {
    Error { code: String, message: String },
    RedirectRead { endpoint: SocketAddr, filename: String },
    RedirectWrite { endpoint: SocketAddr, filename: String, sentence: usize },
    RedirectStream { endpoint: SocketAddr, filename: String },
    Payload(String),
}

impl NsSession {
    pub async fn connect(ns_addr: SocketAddr, username: &str) -> std::io::Result<NsSession> {
        let stream = TcpStream::connect(ns_addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        let mut session = NsSession { reader: BufReader::new(read_half), writer: write_half };
        session.send_raw(&format!("REGISTER_CLIENT;{username}")).await?;
        let reply = session.read_reply().await?;
        if let NsReply::Error { code, message } = &reply {
            tracing::error!(code, message, "client registration rejected");
        }
        Ok(session)
    }

    async fn send_raw(&mut self, line: &str) -> std::io::Result<()> {
        let mut line = line.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn read_reply(&mut self) -> std::io::Result<NsReply> {
        let bytes = protocol::read_until_marker(&mut self.reader, NS_END).await?;
        let text = String::from_utf8_lossy(&bytes).trim_end().to_string();
        Ok(parse_reply(&text))
    }

    /// Send one command and read the full reply (§4.5: "serializes user
    /// commands ... sends, then reads until `__END__`").
    pub async fn request(&mut self, command: &str) -> std::io::Result<NsReply> {
        self.send_raw(command).await?;
        self.read_reply().await
    }

    /// Drive a full write session against the storage server at
    /// `endpoint`, then report the commit back to NS with a follow-up
    /// `UPDATE_META;file` on this connection so the catalog's cached
    /// word/char counts stay current (§4.5 write helper).
    pub async fn write_then_update_meta(
        &mut self,
        endpoint: SocketAddr,
        filename: &str,
        sentence: usize,
        edits: &[ss_helpers::WriteEdit],
    ) -> Result<NsReply, ss_helpers::WriteError> {
        ss_helpers::write_sentence(endpoint, filename, sentence, edits).await?;
        Ok(self.request(&format!("UPDATE_META;{filename}")).await?)
    }
}

fn parse_reply(text: &str) -> NsReply {
    let mut parts = text.splitn(2, ';');
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default();

    match head {
        "ERROR" => {
            let mut rest_parts = rest.splitn(2, ';');
            let code = rest_parts.next().unwrap_or_default().to_string();
            let message = rest_parts.next().unwrap_or_default().to_string();
            NsReply::Error { code, message }
        }
        "REDIRECT_READ" => {
            let fields: Vec<&str> = rest.splitn(3, ';').collect();
            if let [ip, port, filename] = fields[..] {
                if let Ok(endpoint) = format!("{ip}:{port}").parse() {
                    return NsReply::RedirectRead { endpoint, filename: filename.to_string() };
                }
            }
            NsReply::Payload(text.to_string())
        }
        "REDIRECT_STREAM" => {
            let fields: Vec<&str> = rest.splitn(3, ';').collect();
            if let [ip, port, filename] = fields[..] {
                if let Ok(endpoint) = format!("{ip}:{port}").parse() {
                    return NsReply::RedirectStream { endpoint, filename: filename.to_string() };
                }
            }
            NsReply::Payload(text.to_string())
        }
        "REDIRECT_WRITE" => {
            let fields: Vec<&str> = rest.splitn(4, ';').collect();
            if let [ip, port, filename, sentence] = fields[..] {
                if let (Ok(endpoint), Ok(sentence)) =
                    (format!("{ip}:{port}").parse(), sentence.parse::<usize>())
                {
                    return NsReply::RedirectWrite { endpoint, filename: filename.to_string(), sentence };
                }
            }
            NsReply::Payload(text.to_string())
        }
        _ => NsReply::Payload(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_reply() {
        let reply = parse_reply("ERROR;404;file 'x' not found");
        assert_eq!(reply, NsReply::Error { code: "404".to_string(), message: "file 'x' not found".to_string() });
    }

    #[test]
    fn parses_redirect_read() {
        let reply = parse_reply("REDIRECT_READ;127.0.0.1;9001;notes.txt");
        assert_eq!(
            reply,
            NsReply::RedirectRead { endpoint: "127.0.0.1:9001".parse().unwrap(), filename: "notes.txt".to_string() }
        );
    }

    #[test]
    fn parses_redirect_write_with_sentence() {
        let reply = parse_reply("REDIRECT_WRITE;127.0.0.1;9001;notes.txt;2");
        assert_eq!(
            reply,
            NsReply::RedirectWrite {
                endpoint: "127.0.0.1:9001".parse().unwrap(),
                filename: "notes.txt".to_string(),
                sentence: 2,
            }
        );
    }

    #[test]
    fn anything_else_is_free_text_payload() {
        let reply = parse_reply("notes.txt\ntodo.txt");
        assert_eq!(reply, NsReply::Payload("notes.txt\ntodo.txt".to_string()));
    }
}
