use anyhow::{Context, Result};
use clap::Parser;
use socks5_proxy::{DEFAULT_PORT, Socks5Handler, Socks5Server, TcpListenerFactory};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, info_span, warn};

const LOG_FILE_DEFAULT_NAME: &str = "proxy-socks5.log";

#[derive(Parser, Debug)]
#[command(author, version, about = "A lightweight SOCKS5 proxy", long_about = None)]
struct Args {
    /// Port for listening clients
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to the log file, or "-" for stderr [default: <tmpdir>/proxy-socks5.log]
    #[arg(long)]
    log: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    let log_path = args
        .log
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE_DEFAULT_NAME));
    init_tracing(&log_path, args.verbose)?;

    // Instantiate server
    let server = Socks5Server::new(TcpListenerFactory::default(), Socks5Handler::new())
        .with_port(args.port)
        .with_span(info_span!("socks5", port = args.port));

    // Run it until Ctrl-C, then let open connections finish
    info!("Starting SOCKS5 proxy on port {}", args.port);
    server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl-C, draining connections"),
                Err(e) => {
                    warn!("cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await
                }
            }
        })
        .await
        .context("run proxy")
}

/// init_tracing installs the global subscriber, writing to stderr or
/// appending to a log file
fn init_tracing(log_path: &Path, verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    if log_path == Path::new("-") {
        tracing_subscriber::fmt().with_max_level(level).init();
        return Ok(());
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    Ok(())
}
