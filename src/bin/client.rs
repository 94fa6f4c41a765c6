//! Interactive client binary: a thin entry point over
//! [`distrifs::client`]. Reading and parsing the user's command line is
//! the one piece the spec explicitly keeps out of scope (§1); this
//! binary does the minimum — split on whitespace, forward verbatim to
//! the name server — and leaves richer input handling (quoting,
//! history, tab completion, …) to whatever thin wrapper an operator
//! wants to put in front of it.

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use distrifs::client::ss_helpers;
use distrifs::client::{NsReply, NsSession};
use distrifs::config;

/// Distributed file service interactive client.
#[derive(Parser, Debug)]
#[command(name = "client", about = "Distributed file service interactive client")]
struct Args {
    /// Optional TOML file with defaults for any flag left unset here.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name server to connect to.
    #[arg(long)]
    ns: Option<SocketAddr>,

    /// Username to register as.
    #[arg(long)]
    username: Option<String>,
}

const STREAM_TOKEN_DELAY: Duration = Duration::from_millis(120);

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "client=warn".into()),
        )
        .init();

    let args = Args::parse();
    let file_cfg = args.config.as_deref().map(config::load_file_config).transpose()?.unwrap_or_default();

    let ns_addr = args.ns.or(file_cfg.ns).unwrap_or_else(|| "127.0.0.1:9000".parse().unwrap());
    let username = args.username.or(file_cfg.username).unwrap_or_else(|| "guest".to_string());

    let mut session = match NsSession::connect(ns_addr, &username).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("could not connect to name server at {ns_addr}: {e}");
            std::process::exit(1);
        }
    };
    println!("connected to {ns_addr} as '{username}'. type a command, or 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        match session.request(line).await {
            Ok(reply) => handle_reply(&mut session, &mut lines, reply).await,
            Err(e) => {
                eprintln!("connection to name server lost: {e}");
                break;
            }
        }
    }
    Ok(())
}

/// Dispatch on the discriminated reply shape (§4.5): print errors and
/// free-text payloads directly, open a short-lived SS connection for
/// redirects. `lines` is the one stdin reader for the whole session, so
/// a write session's word-by-word prompt never drops input buffered
/// ahead of it.
async fn handle_reply(session: &mut NsSession, lines: &mut Lines<BufReader<Stdin>>, reply: NsReply) {
    match reply {
        NsReply::Error { code, message } => println!("ERROR {code}: {message}"),
        NsReply::Payload(text) => println!("{text}"),
        NsReply::RedirectRead { endpoint, filename } => match ss_helpers::read_file(endpoint, &filename).await {
            Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
            Err(e) => eprintln!("storage server read failed: {e}"),
        },
        NsReply::RedirectStream { endpoint, filename } => {
            let result = ss_helpers::stream_file(endpoint, &filename, STREAM_TOKEN_DELAY, |token| {
                print!("{token} ");
                let _ = std::io::stdout().flush();
            })
            .await;
            println!();
            if let Err(e) = result {
                eprintln!("storage server stream failed: {e}");
            }
        }
        NsReply::RedirectWrite { endpoint, filename, sentence } => {
            drive_write_session(session, lines, endpoint, &filename, sentence).await;
        }
    }
}

/// Prompt for one word per line until a blank line, then `COMMIT_WRITE`
/// and report the result back to NS (§4.4 write-session state machine,
/// §4.5 write helper). Splitting raw lines into words/commands is the
/// input-parsing half the spec excludes (§1); this loop only drives the
/// already-decided wire protocol.
async fn drive_write_session(
    session: &mut NsSession,
    lines: &mut Lines<BufReader<Stdin>>,
    endpoint: SocketAddr,
    filename: &str,
    sentence: usize,
) {
    println!("editing sentence {sentence} of '{filename}'; one word per line, blank line to commit:");
    let mut edits = Vec::new();
    let mut idx = 0usize;
    loop {
        print!("word {idx}> ");
        let _ = std::io::stdout().flush();
        let Ok(Some(line)) = lines.next_line().await else { break };
        let word = line.trim();
        if word.is_empty() {
            break;
        }
        edits.push(ss_helpers::WriteEdit { idx, content: word.to_string() });
        idx += 1;
    }

    // UPDATE_META never comes back as a redirect, so there is no risk of
    // looping back into another write session here.
    match session.write_then_update_meta(endpoint, filename, sentence, &edits).await {
        Ok(NsReply::Error { code, message }) => println!("ERROR {code}: {message}"),
        Ok(other) => println!("{other:?}"),
        Err(e) => eprintln!("write session failed: {e:?}"),
    }
}
