// src/main.rs
//! Self-Healing Monitor entry point
//! Loads configuration, builds the monitor and serves the HTTP/WebSocket relay.
use anyhow::Result;
use clap::{Parser, Subcommand};
use self_healing_monitor::api::server::MonitorServer;
use self_healing_monitor::api::server_config::DEFAULT_PORT;
use self_healing_monitor::monitor::{spawn_feed, Monitor, MonitorConfig, RawActivity};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "self-healing-monitor")]
#[command(about = "Self-healing blockchain attack monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to a TOML or JSON config file (falls back to CONFIG_PATH)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitor and its API server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to bind (falls back to PORT, then 3000)
        #[arg(long)]
        port: Option<u16>,
        /// Also read JSON activity records, one per line, from stdin
        #[arg(long)]
        stdin_feed: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging()?;

    let config = load_config(args.config)?;

    match args.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Serve {
            host,
            port,
            stdin_feed,
        }) => serve(config, host, resolve_port(port), stdin_feed).await?,
        None => {
            info!("No command specified, starting server on default port");
            serve(config, "0.0.0.0".to_string(), resolve_port(None), false).await?;
        }
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,h2=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// `--config`, then CONFIG_PATH, then defaults; env overrides always apply
fn load_config(path: Option<PathBuf>) -> Result<MonitorConfig> {
    let path = path.or_else(|| std::env::var("CONFIG_PATH").ok().map(PathBuf::from));

    let Some(path) = path else {
        return Ok(MonitorConfig::from_env()?);
    };

    let mut config = match MonitorConfig::from_file(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load {}: {}. Using default configuration", path.display(), e);
            MonitorConfig::default()
        }
    };

    config.apply_env()?;
    Ok(config)
}

fn resolve_port(port: Option<u16>) -> u16 {
    port.or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(DEFAULT_PORT)
}

async fn serve(config: MonitorConfig, host: String, port: u16, stdin_feed: bool) -> Result<()> {
    info!("Starting Self-Healing Monitor v{}", env!("CARGO_PKG_VERSION"));

    let feed_config = config.feed.clone();
    let monitor = Arc::new(Monitor::new(config)?);
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal.cancel();
    });

    let feed = if stdin_feed {
        let feed = spawn_feed(Arc::clone(&monitor), &feed_config, shutdown.child_token());
        let sender = feed.sender.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<RawActivity>(&line) {
                    Ok(raw) => {
                        if sender.send(raw).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Skipping malformed feed line: {}", e),
                }
            }
        });
        Some(feed)
    } else {
        None
    };

    let server = MonitorServer::new(Arc::clone(&monitor), host, port);
    server.start(shutdown.clone()).await?;

    if let Some(feed) = feed {
        let stats = feed.shutdown().await;
        info!(accepted = stats.accepted, rejected = stats.rejected, "Feed drained");
    }
    Ok(())
}
