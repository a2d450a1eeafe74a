//! Optional self-improvement hook.
//!
//! Runs an external script once, non-interactively: `MAX_ITERATIONS=1` is
//! forced in its environment, a seed line and an `exit` token are written to
//! its stdin, and its output is captured under a hard timeout. Every failure
//! is downgraded to a warning so the hook can never stall or break the loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::process::{self, SubprocessResult};

/// Upper bound on one self-improvement run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Seed used when the caller does not supply one
pub const DEFAULT_SEED: &str =
    "Calibrate on: produce a 3-5 step plan to improve orchestrator reliability.";

/// Token that tells the script to stop reading input
pub const END_TOKEN: &str = "exit";

/// Environment variable that limits the script to a single iteration
pub const MAX_ITERATIONS_VAR: &str = "MAX_ITERATIONS";

/// How a self-improvement run ended
#[derive(Debug)]
pub enum SelfImproveOutcome {
    /// The script does not exist; nothing was launched
    Skipped,
    /// The script ran and exited with status zero
    Completed(SubprocessResult),
    /// Launch failure, non-zero exit, or timeout (already logged)
    Failed(String),
}

/// Interpreter used for a non-executable `.py` script when none is configured
pub const PYTHON_INTERPRETER: &str = "python3";

/// Launches the self-improvement script with a bounded wait
#[derive(Debug, Clone)]
pub struct SelfImproveInvoker {
    interpreter: Option<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Default for SelfImproveInvoker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SelfImproveInvoker {
    /// Create an invoker
    ///
    /// With an interpreter the script is passed to it as the first argument.
    /// Without one, an executable script is run directly and a `.py` script
    /// is handed to `python3`.
    pub fn new(interpreter: Option<String>) -> Self {
        Self {
            interpreter,
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve relative scripts against `dir` instead of the process working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the script once; never returns an error
    pub async fn run_once(&self, script: &Path, seed: Option<&str>) -> SelfImproveOutcome {
        let script = match self.resolve(script) {
            Ok(path) => path,
            Err(e) => {
                warn!("Self-improving prompt run failed: {}", e);
                return SelfImproveOutcome::Failed(e.to_string());
            }
        };

        if !script.is_file() {
            debug!("Self-improvement script {} not found, skipping", script.display());
            return SelfImproveOutcome::Skipped;
        }

        match self.invoke(&script, seed.unwrap_or(DEFAULT_SEED)).await {
            Ok(result) => {
                info!("[SelfImproving] stdout:\n{}", result.stdout);
                if !result.stderr.is_empty() {
                    warn!("[SelfImproving] stderr:\n{}", result.stderr);
                }
                if result.success() {
                    SelfImproveOutcome::Completed(result)
                } else {
                    let reason = format!("script exited with {}", result.status);
                    warn!("Self-improving prompt run failed: {}", reason);
                    SelfImproveOutcome::Failed(reason)
                }
            }
            Err(e) => {
                warn!("Self-improving prompt run failed: {}", e);
                SelfImproveOutcome::Failed(e.to_string())
            }
        }
    }

    /// Absolute script path; a bare relative path must never go through PATH lookup
    fn resolve(&self, script: &Path) -> std::io::Result<PathBuf> {
        if script.is_absolute() {
            return Ok(script.to_path_buf());
        }
        let base = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(base.join(script))
    }

    /// Build the launch command for an already resolved script
    fn command_for(&self, script: &Path) -> Command {
        let interpreter = match &self.interpreter {
            Some(interpreter) => Some(interpreter.as_str()),
            None if !is_executable(script)
                && script.extension().is_some_and(|ext| ext == "py") =>
            {
                Some(PYTHON_INTERPRETER)
            }
            None => None,
        };

        let mut cmd = match interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(script);
                cmd
            }
            None => Command::new(script),
        };
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.env(MAX_ITERATIONS_VAR, "1");
        cmd
    }

    async fn invoke(&self, script: &Path, seed: &str) -> Result<SubprocessResult> {
        let mut cmd = self.command_for(script);

        debug!("Launching self-improvement script {}", script.display());
        let child = process::spawn_piped(&mut cmd)?;
        let input = format!("{}\n{}\n", seed, END_TOKEN);
        process::communicate(child, &input, Some(self.timeout)).await
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}
