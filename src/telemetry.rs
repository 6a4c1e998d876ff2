/// Telemetry - structured logging with tracing
///
/// - JSON or pretty output
/// - Optional log file with daily/hourly rotation
/// - RUST_LOG overrides the configured level
/// - Truncation and sampling helpers for log fields

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "trace", "debug", "info", "warn" or "error"
    pub log_level: String,
    /// "json" or "pretty"
    pub log_format: String,
    /// None logs to stderr only
    pub log_file: Option<String>,
    /// "daily", "hourly" or "never"
    pub rotation: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
            log_format: std::env::var("SCRIPTSCAN_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            log_file: std::env::var("SCRIPTSCAN_LOG_FILE").ok(),
            rotation: "daily".to_string(),
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
pub fn init_tracing(config: &TelemetryConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let json = config.log_format == "json";

    let Some(log_file_path) = &config.log_file else {
        // stdout carries command output, logs go to stderr
        if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
                .try_init()?;
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_file(true)
                        .with_line_number(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        return Ok(None);
    };

    let path = std::path::Path::new(log_file_path);
    let directory = path
        .parent()
        .ok_or("Invalid log file path: no parent directory")?;
    let file_name = path
        .file_name()
        .ok_or("Invalid log file path: no file name")?;
    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or("Invalid log file path: no file name")?;

    let appender = match config.rotation.as_str() {
        "hourly" => rolling::hourly(directory, prefix),
        "never" => rolling::never(directory, file_name),
        _ => rolling::daily(directory, prefix),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(writer),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(writer),
            )
            .try_init()?;
    }

    Ok(Some(guard))
}

/// Shorten a hash or script for a log field.
///
/// "0a1b2c3d4e5f67890a1b2c3d4e5f6789" with len 16 becomes "0a1b2c3d4e5f6789..."
pub fn truncate_hex(hex: &str, len: usize) -> String {
    match hex.get(..len) {
        Some(head) if hex.len() > len => format!("{}...", head),
        _ => hex.to_string(),
    }
}

/// Sampling counter for progress logs: `should_log` is true on the first
/// call and every `interval` calls after that.
pub struct ProgressCounter {
    counter: AtomicU64,
    interval: u64,
}

impl ProgressCounter {
    pub fn new(interval: u64) -> Self {
        Self {
            counter: AtomicU64::new(0),
            interval: interval.max(1),
        }
    }

    pub fn should_log(&self) -> bool {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        count % self.interval == 0
    }

    pub fn get(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
