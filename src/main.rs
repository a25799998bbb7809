//! liqshell - command line client for the Liquidsoap server protocol.
//!
//! This is the main entry point. It parses the command line, resolves the
//! server address, and either runs the given command files in order or
//! drops into the interactive console.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use futures::FutureExt;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use liqshell::batch;
use liqshell::console::Console;
use liqshell::history::History;
use liqshell::proto::{with_connection, ServerAddr};

/// Command line client for Liquidsoap servers.
#[derive(Debug, Parser)]
#[command(name = "liqshell", version, about)]
struct Args {
    /// Server address: host:port for TCP, otherwise a Unix socket path.
    #[arg(
        short = 's',
        long = "socket",
        value_name = "ADDR",
        default_value = "localhost:1234"
    )]
    socket: String,

    /// Command files to run instead of starting the console.
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging. Stdout carries server responses, so logs go to
    // stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "liqshell=warn".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Args::parse();
    let addr = ServerAddr::parse(&args.socket)?;
    debug!("using server address {}", addr);

    if args.files.is_empty() {
        run_interactive(addr).await
    } else {
        run_batch(addr, &args.files).await
    }
}

/// Run the interactive console over one connection, closing it on the way
/// out whatever happens inside.
async fn run_interactive(addr: ServerAddr) -> Result<()> {
    let history = match History::default_path() {
        Some(path) => History::load(path),
        None => {
            debug!("no home directory, command history will not be saved");
            History::ephemeral()
        }
    };
    let mut console = Console::new(history);

    with_connection(addr, move |conn| {
        async move { console.run(conn).await }.boxed()
    })
    .await
}

/// Run each command file over its own connection. Ctrl+C stops between
/// commands and still closes the connection politely.
async fn run_batch(addr: ServerAddr, files: &[PathBuf]) -> Result<()> {
    for path in files {
        let path = path.clone();
        let interrupted = with_connection(addr.clone(), move |conn| {
            async move {
                tokio::select! {
                    result = batch::run_file(conn, &path) => result.map(|()| false),
                    _ = tokio::signal::ctrl_c() => Ok(true),
                }
            }
            .boxed()
        })
        .await?;

        if interrupted {
            eprintln!("Interrupted.");
            break;
        }
    }
    Ok(())
}
