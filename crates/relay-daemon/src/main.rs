//! # signal-relay
//!
//! Relay daemon: loads settings, initializes logging and metrics, and runs
//! the WebSocket signaling server until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::{RelayServer, ServerConfig, resolver_from_settings};
use relay_settings::RelaySettings;

/// WebRTC signaling relay.
#[derive(Parser, Debug)]
#[command(name = "signal-relay", about = "WebRTC signaling relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.signal-relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `relay_server=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// CLI flags take precedence over file and environment.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn load_settings(cli: &Cli) -> Result<RelaySettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    relay_core::init_subscriber(&settings.logging.level, settings.logging.format);

    let config = ServerConfig::from_settings(&settings);
    let shutdown_timeout = config.shutdown_timeout();
    let resolver = resolver_from_settings(&settings.identity);
    let mut server = RelayServer::new(config, resolver);
    match relay_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!(
        identity_source = ?settings.identity.source,
        target_field = %settings.routing.target_field,
        "Signal relay listening on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().graceful_shutdown(shutdown_timeout).await {
        tracing::warn!(
            remaining = server.shutdown().active_tasks(),
            "sessions still open after shutdown timeout"
        );
    }
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
