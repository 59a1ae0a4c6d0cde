use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::settings::LoggingSettings;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "KVOX_LOG";

/// Install the global subscriber. Logs go to stderr, never stdout, because
/// stdout belongs to the protocol. Keep the returned guard alive for the
/// life of the process when file logging is on.
pub fn setup_tracing(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    let (file_layer, guard) = if settings.file {
        let trace_dir = trace_dir()?;
        std::fs::create_dir_all(&trace_dir)
            .with_context(|| format!("Failed to create trace directory {trace_dir:?}"))?;
        let appender = tracing_appender::rolling::never(&trace_dir, "kvox.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if settings.file {
        info!("Tracing initialized to {:?}", trace_dir()?.join("kvox.log"));
    }
    Ok(guard)
}

fn trace_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".kvox").join("trace"))
}
