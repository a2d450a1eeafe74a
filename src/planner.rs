use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::memory::{Memory, MemoryLevel};
use crate::process;

/// Trait for planner implementations (external command, stub, or mock)
#[async_trait]
pub trait Planner: Send + Sync {
    /// Run exactly one planning step; any failure is reported as an error
    async fn loop_once(&self) -> anyhow::Result<()>;
}

/// Stand-in planner used when no real planner is configured
pub struct StubPlanner {
    memory: Arc<dyn Memory>,
}

impl StubPlanner {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Planner for StubPlanner {
    async fn loop_once(&self) -> anyhow::Result<()> {
        self.memory
            .log(MemoryLevel::Debug, "Running planner step (stub)");
        Ok(())
    }
}

/// Planner that runs one step as an external shell command
///
/// The feature flags and storage location are exported to the command so
/// that it sees the same configuration snapshot as the loop.
pub struct CommandPlanner {
    command: String,
    env: Vec<(&'static str, String)>,
}

impl CommandPlanner {
    pub fn new(command: impl Into<String>, config: &Config) -> Self {
        Self {
            command: command.into(),
            env: vec![
                ("ENABLE_LLM", config.enable_llm.to_string()),
                ("ENFORCE_APPROVALS", config.approvals_enforced.to_string()),
                ("AUTO_PROCESS_ALL", config.auto_process_all.to_string()),
                ("DB_PATH", config.db_path.display().to_string()),
            ],
        }
    }
}

#[async_trait]
impl Planner for CommandPlanner {
    async fn loop_once(&self) -> anyhow::Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.command).envs(self.env.iter().cloned());

        debug!("Spawning planner command: {}", self.command);
        let child = process::spawn_piped(&mut cmd)
            .with_context(|| format!("failed to launch planner command `{}`", self.command))?;
        let result = process::communicate(child, "", None).await?;

        let stdout = result.stdout.trim();
        if !stdout.is_empty() {
            debug!("planner stdout: {}", stdout);
        }

        if !result.success() {
            bail!(
                "planner command exited with {}: {}",
                result.status,
                result.stderr.trim()
            );
        }
        Ok(())
    }
}

/// Choose the command planner when one is configured, else the stub
pub fn build_planner(config: &Config, memory: Arc<dyn Memory>) -> Arc<dyn Planner> {
    match &config.planner_command {
        Some(command) => Arc::new(CommandPlanner::new(command.clone(), config)),
        None => Arc::new(StubPlanner::new(memory)),
    }
}
