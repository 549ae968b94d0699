#![deny(clippy::all)]

mod cli;
mod clipboard;
mod collection;
mod config;
mod debounce;
mod error;
mod export;
mod generation;
mod model;
mod orchestrator;
mod preferences;
mod session;
mod share;
mod storage;
mod voice;

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};

/// Generate scripts, captions, hashtags and thumbnail text for short videos
#[derive(Parser)]
#[command(name = "shortgen", version)]
#[command(about = "AI shorts generator for the terminal", long_about = None)]
struct Args {
    /// Open a share link instead of starting empty
    #[arg(long, value_name = "URL")]
    open: Option<String>,

    /// Directory for history, favorites and preferences
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Use the built-in offline generator even if an endpoint is configured
    #[arg(long)]
    offline: bool,

    /// Log at info level instead of warnings only
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::INFO
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let config = config::load_config()?;

    let storage = storage::open_store(args.data_dir);
    let service = generation::service_from_config(&config, args.offline)?;
    let recognizer = voice::platform_recognizer(&config.voice);
    let session = session::Session::init(&config, storage, service, recognizer)?;

    if let Some(link) = args.open.as_deref() {
        match session.hydrate(link) {
            session::HydrateOutcome::Hydrated => info!("Opened share link"),
            session::HydrateOutcome::Fallback(e) => eprintln!("Invalid share link: {}", e),
            session::HydrateOutcome::NotShareLink => eprintln!("Not a share link: {}", link),
        }
    }

    cli::run(session).await
}
