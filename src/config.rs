use std::path::PathBuf;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

/// Runtime configuration, built once at startup and never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Storage location handed to the memory collaborator
    pub db_path: PathBuf,
    /// Minutes between planner iterations (1..=MAX_INTERVAL_MIN)
    pub interval_min: u64,
    /// Whether the planner may call out to an LLM
    pub enable_llm: bool,
    /// Whether planner actions require approval
    pub approvals_enforced: bool,
    /// Whether the planner may process every pending item in one step
    pub auto_process_all: bool,
    /// Run the self-improvement hook after every iteration
    pub self_improve_each_loop: bool,
    /// Script launched by the self-improvement hook
    pub self_improve_script: PathBuf,
    /// Program used to launch the script (None = run it directly, or python3
    /// for a non-executable `.py` script)
    pub self_improve_interpreter: Option<String>,
    /// Seed line for the script (None = calibration prompt)
    pub self_improve_seed: Option<String>,
    /// Shell command implementing one planner step (None = stub planner)
    pub planner_command: Option<String>,
    /// Process log file (None = stderr)
    pub log_file: Option<PathBuf>,
    /// Mirror the log file to stdout
    pub log_tee: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/income_ai.db")
}

fn default_interval_min() -> u64 {
    30
}

fn default_self_improve_script() -> PathBuf {
    PathBuf::from("self_improving_prompt.py")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            interval_min: default_interval_min(),
            enable_llm: false,
            approvals_enforced: true,
            auto_process_all: false,
            self_improve_each_loop: false,
            self_improve_script: default_self_improve_script(),
            self_improve_interpreter: None,
            self_improve_seed: None,
            planner_command: None,
            log_file: None,
            log_tee: false,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Empty values count as unset. Any value that is present but cannot be
    /// parsed is an error; there is no partial configuration.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let interval_min = match get("CHECK_INTERVAL_MIN") {
            Some(raw) => parse_interval(&raw)?,
            None => defaults.interval_min,
        };

        let flag = |key: &str, default: bool| -> Result<bool> {
            match get(key) {
                Some(raw) => parse_flag(key, &raw),
                None => Ok(default),
            }
        };

        let enable_llm = flag("ENABLE_LLM", false)? || flag("USE_REAL_OPENAI", false)?;

        Ok(Self {
            db_path: get("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            interval_min,
            enable_llm,
            approvals_enforced: flag("ENFORCE_APPROVALS", defaults.approvals_enforced)?,
            auto_process_all: flag("AUTO_PROCESS_ALL", defaults.auto_process_all)?,
            self_improve_each_loop: flag("SELF_IMPROVE_EACH_LOOP", defaults.self_improve_each_loop)?,
            self_improve_script: get("SELF_IMPROVE_SCRIPT")
                .map(PathBuf::from)
                .unwrap_or(defaults.self_improve_script),
            self_improve_interpreter: get("SELF_IMPROVE_INTERPRETER"),
            self_improve_seed: get("SELF_IMPROVE_SEED"),
            planner_command: get("PLANNER_COMMAND"),
            log_file: get("LOG_FILE").map(PathBuf::from),
            log_tee: flag("LOG_TEE", defaults.log_tee)?,
        })
    }

    /// The scheduling interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_min * 60)
    }
}

/// Largest accepted interval: one year, in minutes
pub const MAX_INTERVAL_MIN: u64 = 365 * 24 * 60;

fn parse_interval(raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(minutes) if (1..=MAX_INTERVAL_MIN).contains(&minutes) => Ok(minutes),
        _ => Err(OrchestratorError::InvalidInterval(raw.to_string())),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(OrchestratorError::InvalidFlag {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}
