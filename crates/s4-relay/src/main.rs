//! # s4-relay
//!
//! S4 relay server binary: loads settings, installs logging and metrics,
//! and serves the HTTP/WebSocket relay until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use s4_server::config::ServerConfig;
use s4_server::metrics;
use s4_server::server::RelayServer;
use s4_settings::{LogFormat, RelaySettings};

/// How long background tasks get to finish after the shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// S4 robot telemetry and command relay.
#[derive(Parser, Debug)]
#[command(name = "s4-relay", version, about = "S4 robot telemetry and command relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.s4/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Liveness probe period in milliseconds (overrides settings).
    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// Do not install the Prometheus recorder.
    #[arg(long)]
    no_metrics: bool,
}

impl Cli {
    /// Apply flags on top of loaded settings.
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
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
        if let Some(ms) = self.heartbeat_ms {
            settings.relay.heartbeat_interval_ms = ms;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<RelaySettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(s4_settings::settings_path);
    let mut settings = s4_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid command-line override")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let _ = s4_logging::init_subscriber(
        &settings.logging.level,
        settings.logging.format == LogFormat::Json,
    );

    let mut server = RelayServer::new(ServerConfig::from_settings(&settings));
    if !cli.no_metrics {
        let handle = metrics::install_recorder().context("Failed to install metrics recorder")?;
        server = server.with_metrics(handle);
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("S4 relay listening on http://{addr} (WebSocket at ws://{addr} or ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = server
        .shutdown_gracefully(vec![handle], Some(SHUTDOWN_TIMEOUT))
        .await;
    tracing::info!(
        closed = report.closed,
        lingering = report.lingering,
        timed_out = report.timed_out,
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["s4-relay"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.logging.format, LogFormat::Compact);
        assert!(!cli.no_metrics);
    }

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "s4-relay",
            "--host",
            "127.0.0.1",
            "--port",
            "4100",
            "--log-level",
            "debug",
            "--json-logs",
            "--heartbeat-ms",
            "5000",
        ]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 4100);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.relay.heartbeat_interval_ms, 5000);
    }

    #[test]
    fn load_settings_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"relay":{"historyCapacity":42}}"#).unwrap();
        let cli = Cli::parse_from(["s4-relay", "--config", path.to_str().unwrap()]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.relay.history_capacity, 42);
    }

    #[test]
    fn zero_heartbeat_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let cli = Cli::parse_from([
            "s4-relay",
            "--config",
            path.to_str().unwrap(),
            "--heartbeat-ms",
            "0",
        ]);
        assert!(load_settings(&cli).is_err());
    }
}
