//! # DF Companion
//!
//! Companion service for a radio direction-finding instrument.
//!
//! Polls the instrument's bearing and compass endpoints, tracks the
//! operator's position, and keeps the user settings file loaded.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use df_companion::client::HttpTelemetryClient;
use df_companion::config::{Config, LoggingConfig};
use df_companion::coords;
use df_companion::location::{IpApiClient, LocationState, LocationStore, SerialGnss};
use df_companion::polling::{bearing_store, compass_store};
use df_companion::settings::{JsonFileBackend, SettingsStore};
use df_companion::udp::UdpLink;

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside `[logging] dir`
const LOG_FILE_PREFIX: &str = "df-companion.log";

/// Decimal places of the seconds field in logged positions
const DMS_PRECISION: usize = 2;

/// Main entry point for DF Companion
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first CLI argument or `config/default.toml`)
///    - Set up logging with tracing subscriber
///    - Load persisted settings
///
/// 2. **Main Loop**
///    - Bearing, compass and location stores run on their own timers
///    - Log a status line every `[logging] status_interval_s`
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop all stores and the UDP listener
///
/// # Errors
///
/// Returns error if the configuration file is invalid or the HTTP clients
/// cannot be built.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, from_file) = load_config(&config_path)?;

    let _log_guard = init_logging(&config.logging);

    info!("DF Companion v{} starting...", env!("CARGO_PKG_VERSION"));
    if from_file {
        info!("Configuration loaded from {}", config_path);
    } else {
        warn!("No configuration at {}, using defaults", config_path);
    }

    let client = Arc::new(
        HttpTelemetryClient::new(&config.device.base_url, config.device.request_timeout())
            .context("Failed to build instrument client")?,
    );
    info!("Instrument at {}", client.base_url());

    let bearing = bearing_store(Arc::clone(&client))
        .with_interval(config.polling.df_interval())
        .with_stale_after(config.polling.stale_after());
    let compass = compass_store(Arc::clone(&client))
        .with_interval(config.polling.compass_interval())
        .with_stale_after(config.polling.stale_after());

    let gnss = SerialGnss::new(
        config.location.gnss_ports.clone(),
        config.location.baud_rate,
        config.location.fix_timeout(),
    );
    let geolocator = IpApiClient::new(&config.location.ip_fallback_url, config.device.request_timeout())
        .context("Failed to build geolocation client")?;
    let location = LocationStore::new(gnss, geolocator);

    let settings = SettingsStore::new(JsonFileBackend::new(&config.settings.path));
    if let Err(e) = settings.load().await {
        warn!("Using default settings: {}", e);
    }

    let udp = UdpLink::new();
    if config.udp.enabled {
        if let Err(e) = udp.start_listening(config.udp.port).await {
            warn!("UDP link disabled: {}", e);
        }
    }

    bearing.start();
    compass.start();
    location.start();

    let mut status_interval = interval(Duration::from_secs(config.logging.status_interval_s));
    info!("Press Ctrl+C to exit");

    // Main loop
    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                let heading = compass
                    .snapshot()
                    .filter(|s| !s.is_stale)
                    .map(|s| corrected_heading(s.value, settings.compass_offset()));
                let sweep = bearing.snapshot().filter(|s| !s.is_stale);

                info!(
                    "Bearing: {} | Compass: {} | Location: {}",
                    sweep
                        .map(|s| format!("{:.1}° (conf {:.2})", s.value.heading_degrees, s.value.confidence))
                        .or_else(|| bearing.state().last_error)
                        .unwrap_or_else(|| "waiting".to_string()),
                    heading
                        .map(|h| format!("{:.1}°", h))
                        .or_else(|| compass.state().last_error)
                        .unwrap_or_else(|| "waiting".to_string()),
                    describe_location(&location.state()),
                );

                if let Some(n) = udp.state().current_number {
                    info!("UDP number: {}", n);
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    bearing.stop();
    compass.stop();
    location.stop();
    udp.stop_listening().await;

    Ok(())
}

/// Load `path`, or defaults when the file does not exist
fn load_config(path: &str) -> Result<(Config, bool)> {
    if !Path::new(path).exists() {
        return Ok((Config::default(), false));
    }
    let config = Config::load(path).with_context(|| format!("Invalid configuration {}", path))?;
    Ok((config, true))
}

/// Install the tracing subscriber
///
/// With `[logging] dir` set, events also go to a daily rolling file; the
/// returned guard flushes it on drop.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if logging.dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&logging.dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Some(guard)
}

/// Compass heading with the user offset applied, in [0, 360)
fn corrected_heading(heading: f64, offset: f64) -> f64 {
    (heading + offset).rem_euclid(360.0)
}

fn describe_location(state: &LocationState) -> String {
    let Some(reading) = &state.reading else {
        return state
            .error
            .clone()
            .unwrap_or_else(|| "waiting".to_string());
    };

    let lat = coords::to_dms(reading.lat, true, DMS_PRECISION);
    let lon = coords::to_dms(reading.lon, false, DMS_PRECISION);
    match (lat, lon) {
        (Some(lat), Some(lon)) => format!(
            "{} {} ±{:.0} m ({:?})",
            lat, lon, reading.accuracy_meters, reading.source
        ),
        _ => format!("{:.5}, {:.5}", reading.lat, reading.lon),
    }
}
