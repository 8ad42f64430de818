//! switchboard - real-time relay and session/event service

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;
use switchboard::config::{Config, StoreBackend};
use switchboard::server::{AppState, Server};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Real-time WebSocket relay with session and event recording")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Keep sessions and events in memory instead of the remote store
    #[arg(long)]
    memory_store: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.store.apply_env();
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.memory_store {
        config.store.backend = StoreBackend::Memory;
    }

    let state = AppState::from_config(&config)?;
    let server = Server::new(config.server.addr(), state);

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    server.run(shutdown_rx).await
}
