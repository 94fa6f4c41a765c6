//! Shared fixture for end-to-end tests: spin up a real name server and
//! a real storage server on loopback ephemeral ports, wire the storage
//! server into the catalog the same way the `ss` binary's own startup
//! registration does, and hand back both addresses.

use std::net::SocketAddr;
use std::sync::Arc;

use distrifs::catalog::CatalogService;
use distrifs::client::NsSession;
use distrifs::protocol::{self, NS_END};
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub struct Harness {
    pub ns_addr: SocketAddr,
    pub ss_addr: SocketAddr,
    _ns_data: TempDir,
    _ss_root: TempDir,
}

impl Harness {
    pub async fn start() -> Harness {
        let ns_data = tempfile::tempdir().unwrap();
        let ss_root = tempfile::tempdir().unwrap();

        let catalog = Arc::new(CatalogService::new(ns_data.path().to_path_buf()));
        let ns_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ns_addr = ns_listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = distrifs::ns::serve(ns_listener, catalog).await;
        });

        let ss_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ss_addr = ss_listener.local_addr().unwrap();
        let ss_root_path = ss_root.path().to_path_buf();
        tokio::spawn(async move {
            let _ = distrifs::ss::serve(ss_listener, ss_root_path).await;
        });

        register_ss(ns_addr, ss_addr).await;

        Harness { ns_addr, ss_addr, _ns_data: ns_data, _ss_root: ss_root }
    }

    pub async fn connect(&self, username: &str) -> NsSession {
        NsSession::connect(self.ns_addr, username).await.unwrap()
    }
}

/// Drive the one-shot `REGISTER_SS;ip;port;file_csv` handshake directly
/// rather than going through the `ss` binary, since tests exercise the
/// library crate, not the CLI entry points.
async fn register_ss(ns_addr: SocketAddr, ss_addr: SocketAddr) {
    let mut stream = TcpStream::connect(ns_addr).await.unwrap();
    let line = format!("REGISTER_SS;{};{};\n", ss_addr.ip(), ss_addr.port());
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let body = protocol::read_until_marker(&mut reader, NS_END).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("ACK_SS_REG"));
}
