//! Structured logging setup.
//!
//! Diagnostics always go to stderr so hook answers on stdout stay clean JSON.
//! `CONDUCTOR_LOG` takes an `EnvFilter` directive and overrides the default
//! level (`info`, or `debug` with `--verbose`).

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::Config;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "CONDUCTOR_LOG";

/// File name prefix of the rolling log.
const LOG_FILE_PREFIX: &str = "conductor.log";

/// Keeps the background log writer alive; drop it to flush.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

fn filter_for(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "conductor=debug,warn" } else { "conductor=info,warn" })
    })
}

/// Install the global subscriber.
///
/// A subscriber installed earlier (for example by a test harness) is left in
/// place.
pub fn init(config: &Config) -> Result<LoggingGuard> {
    let console_layer = if config.toml.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let (file_layer, file_guard) = if config.toml.logging.file {
        let log_dir = config.conductor_dir.join("logs");
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

        let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(filter_for(config.verbose))
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(LoggingGuard { _file: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConductorToml;
    use tempfile::tempdir;

    #[test]
    fn test_file_logging_creates_log_dir() {
        let dir = tempdir().unwrap();
        let mut toml = ConductorToml::default();
        toml.logging.file = true;
        let config = Config::from_toml(dir.path(), toml, false);

        let guard = init(&config).unwrap();
        tracing::info!("hello");
        drop(guard);

        assert!(dir.path().join(".conductor/logs").is_dir());
    }
}
