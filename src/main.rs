mod config;
mod delivery;
mod fetch;
mod github;
mod health;
mod http;
mod metrics;
mod transfer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::transfer::sftp::SftpWriter;
use crate::transfer::RemoteWriter;

/// Bounded wait applied to both the GitHub fetch and the SSH connect.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "ghcourier", about = "Copies files from GitHub to a VM over SFTP")]
struct Cli {
    /// Socket address for the HTTP listener (overrides GHCOURIER_LISTEN).
    #[arg(short, long)]
    listen: Option<String>,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http_client: reqwest::Client,
    pub metrics: MetricsRegistry,
    /// Remote-copy transport.  The production binary wires in the SFTP
    /// implementation; tests substitute fakes.
    pub writer: Arc<dyn RemoteWriter>,
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState, listen: &str) -> Result<()> {
    let app = http::handler::create_router(Arc::new(state));

    let listen_addr: std::net::SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address: {listen}"))?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // ---- Config ----
    // Credential validation happens here: a process without a usable VM
    // credential must fail at boot, not on the first request.
    let config = Config::from_env().context("invalid configuration")?;
    let config = Arc::new(config);

    tracing::info!(
        vm_host = %config.vm.host,
        vm_user = %config.vm.user,
        destination = %config.vm.destination_dir,
        credential = ?config.vm.credential,
        "starting ghcourier"
    );

    // ---- Infrastructure clients ----
    let http_client = reqwest::Client::builder()
        .user_agent("ghcourier/0.1")
        .timeout(REMOTE_TIMEOUT)
        .build()
        .context("failed to build reqwest client")?;

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- App state ----
    let listen = cli
        .listen
        .clone()
        .unwrap_or_else(|| config.http_listen.clone());

    let state = AppState {
        config,
        http_client,
        metrics,
        writer: Arc::new(SftpWriter::new(REMOTE_TIMEOUT)),
    };

    run_http_server(state, &listen).await?;

    tracing::info!("ghcourier shut down cleanly");
    Ok(())
}
