//! Storage server binary: a thin `clap`-driven entry point over
//! [`distrifs::ss`] that also registers with a name server on startup
//! (§4.4, SPEC_FULL §E.7).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use distrifs::config;
use distrifs::protocol::{self, NS_END};
use distrifs::ss;

/// Distributed file service storage server: owns file bytes and their
/// `.bak` backups under a single root directory.
#[derive(Parser, Debug)]
#[command(name = "ss", about = "Distributed file service storage server")]
struct Args {
    /// Optional TOML file with defaults for any flag left unset here.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to accept client and name-server connections on.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Directory holding this server's files and `.bak` siblings.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Name server to register with. Registration is best-effort: a
    /// name server that is not reachable yet is logged and skipped,
    /// not treated as a fatal startup error (the operator can restart
    /// this process, or the name server can be told about it later via
    /// a protocol not covered by this spec).
    #[arg(long)]
    ns: Option<SocketAddr>,

    /// Address to advertise to the name server in place of `bind`, for
    /// when `bind` is a wildcard address other hosts can't dial back.
    #[arg(long)]
    advertise: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ss=info".into()),
        )
        .init();

    let args = Args::parse();
    let file_cfg = args.config.as_deref().map(config::load_file_config).transpose()?.unwrap_or_default();

    let bind = args.bind.or(file_cfg.bind).unwrap_or_else(|| "127.0.0.1:9001".parse().unwrap());
    let root = args.root.or(file_cfg.root).unwrap_or_else(|| PathBuf::from("ss-data"));
    let ns_addr = args.ns.or(file_cfg.ns);
    let advertise = args.advertise.or(file_cfg.advertise);

    tokio::fs::create_dir_all(&root).await?;
    let listener = TcpListener::bind(bind).await?;
    let local_addr = listener.local_addr()?;
    let advertised = advertise.unwrap_or(local_addr);
    tracing::info!(%local_addr, root = %root.display(), "storage server listening");

    if let Some(ns_addr) = ns_addr {
        let known = ss::known_files(&root).await?;
        match register_with_ns(ns_addr, advertised, &known).await {
            Ok(reply) => tracing::info!(%ns_addr, reply = %reply, "registered with name server"),
            Err(e) => tracing::warn!(%ns_addr, error = %e, "could not register with name server"),
        }
    }

    ss::serve(listener, root).await
}

/// Send `REGISTER_SS;ip;port;file_csv` and return the raw reply line
/// (§4.1 first-frame contract for a storage-server registration).
async fn register_with_ns(
    ns_addr: SocketAddr,
    advertised: SocketAddr,
    known_files: &std::collections::BTreeSet<String>,
) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(ns_addr).await?;
    stream.set_nodelay(true)?;
    let csv = known_files.iter().cloned().collect::<Vec<_>>().join(",");
    let line = format!("REGISTER_SS;{};{};{}\n", advertised.ip(), advertised.port(), csv);
    stream.write_all(line.as_bytes()).await?;
    stream.flush().await?;

    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let body = protocol::read_until_marker(&mut reader, NS_END).await?;
    Ok(String::from_utf8_lossy(&body).trim().to_string())
}
