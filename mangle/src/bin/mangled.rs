//! Packet mangling daemon.
//!
//! Reads control commands from stdin (or a script), writes one reply line per
//! acknowledgement to stdout, and forwards frames between the registered interfaces.
//!
//! Usage:
//!   sudo mangled < rules.conf
//!   sudo mangled --script rules.conf --keep-running

use std::path::PathBuf;

use clap::Parser;
use tokio::{io::AsyncRead, sync::mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mangle::{
    Driver, DriverError, DriverOptions, Engine, EngineOptions, Frame, MemBinder, Redefine, DEFAULT_QUEUE_SIZE,
};

#[derive(Parser, Debug)]
#[command(name = "mangled")]
#[command(about = "Inspect and rewrite packets between network interfaces")]
struct Args {
    /// Read commands from this file instead of stdin
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Replace fields redefined with a different shape instead of rejecting them
    #[arg(long)]
    replace: bool,

    /// Skip the leak report at shutdown
    #[arg(long)]
    no_leak_check: bool,

    /// Capacity of the frame queue
    #[arg(short, long, default_value_t = DEFAULT_QUEUE_SIZE)]
    queue: usize,

    /// Keep forwarding after the end of the command stream, until ctrl-c
    #[arg(short, long)]
    keep_running: bool,

    /// Use in-memory links instead of raw sockets: commands are checked, no traffic is seen
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DriverError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let engine_options = EngineOptions::default()
        .redefine(if args.replace { Redefine::Replace } else { Redefine::Reject })
        .leak_check(!args.no_leak_check);
    let driver_options = DriverOptions::default().frame_queue(args.queue).exit_on_eof(!args.keep_running);

    let (tx, rx) = driver_options.frame_channel();
    let engine = if args.dry_run {
        Engine::with_options(MemBinder::new(tx), engine_options)
    } else {
        raw_engine(tx, engine_options)?
    };

    let control: Box<dyn AsyncRead + Unpin + Send> = match args.script {
        Some(ref path) => {
            info!(script = %path.display(), "reading commands");
            Box::new(tokio::fs::File::open(path).await?)
        }
        None => Box::new(tokio::io::stdin()),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    let report = Driver::with_options(engine, rx, control, tokio::io::stdout(), driver_options)
        .with_shutdown(shutdown)
        .await?;

    if !report.is_clean() {
        warn!(leaks = report.leaks.len(), "objects still referenced at shutdown");
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn raw_engine(tx: mpsc::Sender<Frame>, options: EngineOptions) -> Result<Engine, DriverError> {
    Ok(Engine::with_options(mangle::RawBinder::new(tx), options))
}

#[cfg(not(target_os = "linux"))]
fn raw_engine(_tx: mpsc::Sender<Frame>, _options: EngineOptions) -> Result<Engine, DriverError> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "raw links need Linux, run with --dry-run").into())
}
