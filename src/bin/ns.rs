//! Name server binary: a thin `clap`-driven entry point over
//! [`distrifs::ns`] (§4.1, SPEC_FULL §E.7).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use distrifs::catalog::{persist, CatalogService};
use distrifs::config;
use distrifs::ns;

/// Distributed file service name server: owns the catalog, answers
/// catalog-only queries, and routes or brokers everything else.
#[derive(Parser, Debug)]
#[command(name = "ns", about = "Distributed file service name server")]
struct Args {
    /// Optional TOML file with defaults for any flag left unset here.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to accept client and storage-server connections on.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Directory holding `user_data.dat` and `file_metadata.dat`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// How long to accept `REGISTER_SS` connections before loading the
    /// persisted catalog, so storage servers that dial in promptly are
    /// already known when rows referencing them are loaded (§6: a
    /// persisted file row is dropped, not held pending, if its storage
    /// server isn't registered yet — see DESIGN.md).
    #[arg(long, default_value_t = 300)]
    startup_grace_ms: u64,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ns=info".into()),
        )
        .init();

    let args = Args::parse();
    let file_cfg = args.config.as_deref().map(config::load_file_config).transpose()?.unwrap_or_default();

    let bind = args.bind.or(file_cfg.bind).unwrap_or_else(|| "127.0.0.1:9000".parse().unwrap());
    let data_dir = args.data_dir.or(file_cfg.data_dir).unwrap_or_else(persist::default_data_dir);

    tokio::fs::create_dir_all(&data_dir).await?;
    let catalog = Arc::new(CatalogService::new(data_dir));

    let listener = TcpListener::bind(bind).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "name server accepting registrations");

    let serve_catalog = Arc::clone(&catalog);
    let accept_loop = tokio::spawn(async move { ns::serve(listener, serve_catalog).await });

    if args.startup_grace_ms > 0 {
        tracing::info!(grace_ms = args.startup_grace_ms, "waiting for storage servers to register");
        tokio::time::sleep(Duration::from_millis(args.startup_grace_ms)).await;
    }

    catalog.load().await?;
    tracing::info!(
        users = catalog.list_usernames().await.len(),
        files = catalog.list_files().await.len(),
        "catalog loaded"
    );

    accept_loop.await.map_err(std::io::Error::other)?
}
