//! promptrelay daemon
//!
//! Serves the agent CLI over HTTP: one subprocess per request, answered
//! either as one JSON object or as a live NDJSON stream.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use promptrelay_daemon::server::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(name = "promptrelay-daemon")]
#[command(version, about = "promptrelay daemon - agent CLI over HTTP")]
struct Args {
    /// TCP bind address
    #[arg(long, env = "PROMPTRELAY_ADDR")]
    addr: Option<SocketAddr>,

    /// Project directory searched for `.promptrelay/settings.json`
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Path to the agent CLI binary
    #[arg(long, env = "PROMPTRELAY_AGENT_BIN")]
    agent_bin: Option<PathBuf>,

    /// Model identifier passed to every invocation
    #[arg(long, env = "PROMPTRELAY_MODEL")]
    model: Option<String>,

    /// Deadline for one agent run, in seconds
    #[arg(long, env = "PROMPTRELAY_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, env = "PROMPTRELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "PROMPTRELAY_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let project_dir = match args.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let mut config = promptrelay_core::config::load_config(Some(&project_dir))?;
    if let Some(addr) = args.addr {
        config.daemon.addr = addr;
    }
    if let Some(agent_bin) = args.agent_bin {
        config.session.agent_bin = agent_bin;
    }
    if let Some(model) = args.model {
        config.session.model = model;
    }
    if let Some(secs) = args.timeout_secs {
        config.session.timeout_secs = secs;
    }
    if let Some(level) = args.log_level {
        config.daemon.log_level = level;
    }

    let level = &config.daemon.log_level;
    promptrelay_core::tracing_init::init_tracing(
        &format!("promptrelay_daemon={level},promptrelay_core={level},tower_http={level}"),
        args.log_json,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.daemon.addr,
        agent_bin = %config.session.agent_bin.display(),
        model = %config.session.model,
        timeout_secs = config.session.timeout_secs,
        mcp_servers = config.mcp_servers.len(),
        "Starting promptrelay-daemon"
    );

    let app = build_router(AppState::from_config(&config));
    let listener = tokio::net::TcpListener::bind(config.daemon.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Daemon shut down");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C shutdown signal"),
        () = terminate => info!("Received SIGTERM shutdown signal"),
    }
}
