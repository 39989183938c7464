//! UniWork API Server
//!
//! REST API server for UniWork accounts and authentication.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uniwork_api::{create_router, state::AppState};
use uniwork_core::AppConfig;

#[derive(Parser)]
#[command(name = "uniwork-api")]
#[command(author, version, about = "UniWork accounts and authentication API", long_about = None)]
struct Args {
    /// TOML configuration file; environment variables override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "uniwork_api={level},uniwork_core={level},audit=info,tower_http=info",
            level = config.logging.level
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config);
    config.validate().context("Invalid configuration")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(
        environment = ?config.server.environment,
        backend = ?config.database.backend,
        "Starting UniWork API"
    );

    // Open stores and build shared state
    let state = Arc::new(
        AppState::connect(config)
            .await
            .context("Failed to initialise stores")?,
    );

    state
        .bootstrap_admin()
        .await
        .context("Failed to create administrator account")?;

    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("UniWork API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;

    Ok(())
}
