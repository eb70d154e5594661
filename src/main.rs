//! # WebRender server entry point
//!
//! Loads configuration, installs logging and serves render requests over HTTP until SIGINT
//! or SIGTERM.
//!
//! ## Environment variables
//! - `WEBRENDER_HOST`, `WEBRENDER_PORT`: listen address (default: 0.0.0.0:80)
//! - `WEBRENDER_IMAGE_*`: render defaults (viewport, timeout, delay, user agent, browser)
//! - `WEBRENDER_LOG_LEVEL`: log filter used when `RUST_LOG` is not set

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use webrender::{
    cdp::ChromeLauncher,
    config::Config,
    http::{HttpServer, Routes},
    render::CaptureExecutor,
    session::SessionManager,
};

#[derive(Debug, Parser)]
#[command(name = "webrender", version, about = "Render web pages to PNG or PDF over HTTP")]
struct Cli {
    /// TOML configuration file; environment variables override its values
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the version and exit
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(Command::Version) = cli.command {
        println!("{}", webrender::VERSION);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("WebRender Server v{}", webrender::VERSION);
    info!("Configuration loaded: host={}, port={}", config.host, config.port);

    let sessions = SessionManager::new(Arc::new(ChromeLauncher::new()));
    let executor = CaptureExecutor::new(sessions, config.render_defaults());
    let server = HttpServer::new(executor, Routes::from_config(&config))?;

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    server.serve(listener, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env()?;
            config
        }
        None => Config::from_env()?,
    };
    Ok(config)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM signal"),
                    _ = sigint.recv() => info!("Received SIGINT signal"),
                }
            }
            _ => {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C signal");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C signal");
        }
    }
}
