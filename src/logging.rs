//! Process log setup.
//!
//! One line per event with timestamp, level and message, written to stderr by
//! default, or to `LOG_FILE` (optionally mirrored to stdout with `LOG_TEE`).

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::error::{OrchestratorError, Result};

const DEFAULT_FILTER: &str = "income_orchestrator=info,warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(OrchestratorError::LogFileError)?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(OrchestratorError::LogFileError)
}

/// Install the global subscriber according to `config`
pub fn setup_logging(config: &Config) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter());

    match &config.log_file {
        None => {
            registry
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(std::io::stderr().is_terminal())
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        Some(path) => {
            let file = open_log_file(path)?;
            let file_layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));

            let console_layer = config.log_tee.then(|| {
                fmt::layer()
                    .with_target(false)
                    .with_ansi(std::io::stdout().is_terminal())
                    .with_writer(std::io::stdout)
            });

            registry.with(file_layer).with(console_layer).init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("orchestrator.log");

        open_log_file(&path).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_open_log_file_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_log_file(dir.path());
        assert!(matches!(result, Err(OrchestratorError::LogFileError(_))));
    }
}
