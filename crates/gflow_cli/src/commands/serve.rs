//! Serve command - Run the HTTP surface.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use gflow_server::{serve, AppState};

#[derive(Args)]
pub struct ServeArgs {
    /// Interface to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

pub async fn execute(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!(
        "Active backend: {} (configured: {})",
        config.active_backend.display_name(),
        config
            .backends
            .configured()
            .iter()
            .map(|b| b.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let server = config.server.clone();
    let state = AppState::from_config(config).context("Failed to initialize server")?;

    serve(state, &server, shutdown_signal())
        .await
        .with_context(|| format!("Server on {} failed", server.bind_address()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
