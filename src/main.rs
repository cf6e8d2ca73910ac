//! prom-count
//!
//! Prometheus remote-write receiver exposing active-series and reduced-label
//! cardinality gauges on `/metrics`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use prom_count::config::{format_duration, parse_duration, parse_duration_list};
use prom_count::server::{self, AppState};
use prom_count::{build_trackers, Receiver, Result, TrackerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// prom-count - count active and reduced-label series from remote write
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The HTTP port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Windows for the active series tracker (comma-separated)
    #[arg(long, env = "WINDOWS", default_value = "5m,15m,20m,30m", value_parser = parse_windows)]
    windows: WindowList,

    /// Labels kept by the label count tracker (comma-separated)
    #[arg(long, env = "LABELS", value_delimiter = ',', default_value = "__name__,job")]
    labels: Vec<String>,

    /// How long an unseen series is counted by the label count tracker
    #[arg(long, env = "LABEL_TTL", default_value = "1m", value_parser = parse_ttl)]
    ttl: Duration,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

/// Parsed `--windows` value.
#[derive(Debug, Clone)]
struct WindowList(Vec<Duration>);

fn parse_windows(s: &str) -> std::result::Result<WindowList, String> {
    parse_duration_list(s)
        .map(WindowList)
        .map_err(|e| e.to_string())
}

fn parse_ttl(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

impl Args {
    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            windows: self.windows.0.clone(),
            ttl: self.ttl,
            labels: self.labels.clone(),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = args.tracker_config();
    let windows: Vec<String> = config.windows.iter().map(|w| format_duration(*w)).collect();

    info!("Starting prom-count");
    info!("  Windows: {}", windows.join(", "));
    info!("  Labels: {}", config.labels.join(", "));
    info!("  Label TTL: {}", format_duration(config.ttl));

    let registry = Registry::new();
    let trackers = build_trackers(&config, &registry)?;
    let receiver = Receiver::new(trackers, &registry)?;

    let shutdown = CancellationToken::new();
    let loops = receiver.spawn_recompute_loops(shutdown.clone());

    let state = Arc::new(AppState::new(receiver, registry));
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let result = server::serve(addr, state, shutdown.clone()).await;
    if let Err(e) = &result {
        error!("HTTP server error: {}", e);
    }

    shutdown.cancel();
    for handle in loops {
        if let Err(e) = handle.await {
            error!("Recompute loop failed: {}", e);
        }
    }

    info!("Shutdown complete");
    result
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
