//! # alert-monitor
//!
//! Connects to a storefront push feed and logs every alert snapshot and
//! connection status change until interrupted. Channels run headless, so
//! toasts, speech, tones and banners show up as log lines.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a feed
//! alert-monitor --url wss://shop.example/ws
//!
//! # Load a JSON configuration file
//! alert-monitor --config pipeline.json
//!
//! # With debug logging
//! RUST_LOG=alert_pipeline=debug alert-monitor --url ws://localhost:4000/ws
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use alert_pipeline::channels::{ChannelKind, HeadlessPlatform, NotificationChannels};
use alert_pipeline::{
    ConnectionState, EventEnvelope, Pipeline, PipelineConfig, StatusChange, WebSocketTransport,
    STATUS_TOPIC,
};

/// Storefront alert monitor
#[derive(Parser, Debug)]
#[command(name = "alert-monitor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "ALERT_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Push feed URL (overrides the configuration file)
    #[arg(short, long, env = "ALERT_MONITOR_URL")]
    url: Option<String>,

    /// Base reconnect delay in milliseconds
    #[arg(long, env = "ALERT_MONITOR_RECONNECT_DELAY_MS")]
    reconnect_delay_ms: Option<u64>,

    /// Where to persist channel settings
    #[arg(long, env = "ALERT_MONITOR_SETTINGS")]
    settings: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn load_config(args: &Args) -> alert_pipeline::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::new(args.url.clone().unwrap_or_default()),
    };

    if let Some(url) = &args.url {
        config.connection.url = url.clone();
    }
    if let Some(delay) = args.reconnect_delay_ms {
        config.connection.reconnect_delay_ms = delay;
    }
    if let Some(path) = &args.settings {
        config.settings_path = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if args.validate {
        info!("Configuration is valid");
        return ExitCode::SUCCESS;
    }

    let platform = HeadlessPlatform::echoing();
    let pipeline = match Pipeline::new(
        config,
        Arc::new(WebSocketTransport::new()),
        HeadlessPlatform::backends(&platform),
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to start pipeline");
            return ExitCode::FAILURE;
        }
    };

    log_channel_settings(pipeline.channels());

    let _status = pipeline.subscribe(STATUS_TOPIC, |envelope: &EventEnvelope| {
        if let Some(change) = StatusChange::from_envelope(envelope) {
            match change.status {
                ConnectionState::Error => warn!(
                    attempt = change.attempt,
                    exhausted = change.exhausted,
                    "Connection error"
                ),
                status => info!(status = %status, attempt = change.attempt, "Connection status"),
            }
        }
    });

    let _alerts = pipeline.alerts().subscribe(|alerts| {
        let unacknowledged = alerts.iter().filter(|a| !a.acknowledged).count();
        info!(total = alerts.len(), unacknowledged, "Alert snapshot");
        if let Some(latest) = alerts.first() {
            info!(id = %latest.id, rank = %latest.rank, message = %latest.message, "Latest alert");
        }
    });

    pipeline.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }

    let stats = pipeline.stats();
    info!(
        events = stats.events_routed,
        alerts = stats.alert_count,
        unacknowledged = stats.unacknowledged_count,
        "Shutting down"
    );
    pipeline.stop();
    ExitCode::SUCCESS
}

fn log_channel_settings(channels: &NotificationChannels) {
    let settings = channels.settings();
    for kind in ChannelKind::ALL {
        let config = settings.get(kind);
        info!(channel = %kind, enabled = config.enabled, volume = ?config.volume, "Channel");
    }
}
