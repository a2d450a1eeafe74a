use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// CHECK_INTERVAL_MIN is not a positive integer
    #[error("invalid interval {0:?}: expected a whole number of minutes between 1 and 525600")]
    InvalidInterval(String),

    /// A boolean environment flag holds an unrecognised value
    #[error("invalid value {value:?} for {name}: expected true or false")]
    InvalidFlag { name: String, value: String },

    /// The .env file exists but could not be parsed
    #[error("failed to load .env file: {0}")]
    DotEnvError(String),

    /// The configured log file could not be opened
    #[error("failed to open log file: {0}")]
    LogFileError(#[source] std::io::Error),

    /// Installing a termination signal handler failed
    #[error("failed to install signal handler: {0}")]
    SignalInstallError(#[source] std::io::Error),

    /// Failed to spawn a child process
    #[error("failed to spawn process: {0}")]
    ProcessSpawnError(#[source] std::io::Error),

    /// Error communicating with a child process
    #[error("process I/O error: {0}")]
    ProcessIoError(#[source] std::io::Error),

    /// A child process did not finish before its deadline
    #[error("process timed out after {0:?}")]
    ProcessTimeout(Duration),
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;
