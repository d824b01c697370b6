//! Telemetry and logging initialization.
//!
//! Sets up structured logging with tracing and optional JSON output.

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Keeps the non-blocking file writer flushing until the process exits
static LOG_GUARD: Mutex<Option<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(None);

/// Initialize logging to stderr.
pub fn init_telemetry(log_level: &str, json_format: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;
    let stderr = fmt::layer().with_writer(std::io::stderr);

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr.json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr.pretty())
            .try_init()?;
    }

    Ok(())
}

/// Initialize logging to an append-only file.
pub fn init_telemetry_with_file(
    log_level: &str,
    json_format: bool,
    log_file: &Path,
) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| anyhow::anyhow!("Failed to open log file '{}': {}", log_file.display(), e))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()?;
    }

    if let Ok(mut slot) = LOG_GUARD.lock() {
        *slot = Some(guard);
    }

    Ok(())
}
