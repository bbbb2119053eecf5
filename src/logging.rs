//! Subscriber setup for the CLI: readable events on stderr, plus an optional
//! daily-rotated plain-text copy on disk.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "compare-effects.log";

/// Flushes the background file writer on drop; hold it until exit.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Non-blocking daily-rolling writer under `dir`, created if missing.
pub fn file_writer(dir: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    Ok(tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX)))
}

/// Install the global subscriber described by `config`.
///
/// Returns a guard only while file output is active. If a subscriber is
/// already installed the call changes nothing.
pub fn init_tracing(config: &LoggingConfig) -> Option<FileLogGuard> {
    let file = config.file_dir.as_deref().and_then(|dir| match file_writer(dir) {
        Ok(pair) => Some(pair),
        Err(err) => {
            eprintln!("file logging disabled, cannot use {}: {err}", dir.display());
            None
        }
    });

    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.filter))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .ok()?;

    guard.map(|guard| FileLogGuard { _guard: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");

        let (_writer, _guard) = file_writer(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_file_writer_rejects_file_path() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("taken");
        std::fs::write(&blocker, "not a directory").unwrap();

        assert!(file_writer(&blocker.join("logs")).is_err());
    }

    #[test]
    fn test_stderr_only_has_no_guard() {
        let config = LoggingConfig {
            filter: "not a [valid directive".to_string(),
            file_dir: None,
        };
        assert!(init_tracing(&config).is_none());
        // a second install is ignored
        assert!(init_tracing(&config).is_none());
    }
}
