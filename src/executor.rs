use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{error, info};

use crate::memory::{Memory, MemoryLevel};
use crate::planner::Planner;
use crate::self_improve::{SelfImproveInvoker, SelfImproveOutcome};

/// Whether the planner step of an iteration succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Succeeded,
    Failed,
}

/// Self-improvement settings applied after every iteration
#[derive(Debug, Clone)]
pub struct SelfImproveHook {
    pub invoker: SelfImproveInvoker,
    pub script: PathBuf,
    pub seed: Option<String>,
}

/// Runs one planner step per call and contains every failure it raises
pub struct IterationExecutor {
    planner: Arc<dyn Planner>,
    memory: Arc<dyn Memory>,
    hook: Option<SelfImproveHook>,
    iteration: u64,
}

impl IterationExecutor {
    pub fn new(planner: Arc<dyn Planner>, memory: Arc<dyn Memory>) -> Self {
        Self {
            planner,
            memory,
            hook: None,
            iteration: 0,
        }
    }

    /// Run the self-improvement hook after each planner step
    pub fn with_self_improve(mut self, hook: SelfImproveHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Number of iterations started so far
    pub fn iterations(&self) -> u64 {
        self.iteration
    }

    /// Run exactly one planner step, then the self-improvement hook if set
    ///
    /// Planner errors and panics are recorded to memory at ERROR and to the
    /// process log, never propagated. The hook's own outcome does not affect
    /// the returned classification.
    pub async fn run_once(&mut self) -> IterationOutcome {
        self.iteration += 1;
        let iteration = self.iteration;
        info!("Starting iteration {}", iteration);

        // A separate task turns a panicking planner into a JoinError
        let planner = Arc::clone(&self.planner);
        let joined = tokio::spawn(async move { planner.loop_once().await }).await;

        let outcome = match joined {
            Ok(Ok(())) => {
                info!("Iteration {} complete", iteration);
                IterationOutcome::Succeeded
            }
            Ok(Err(err)) => {
                self.memory
                    .log(MemoryLevel::Error, &format!("Loop error: {}", err));
                error!("Planner loop error in iteration {}: {:?}", iteration, err);
                IterationOutcome::Failed
            }
            Err(join_err) => {
                // The panic hook has already printed the location and, with
                // RUST_BACKTRACE=1, the stack
                let detail = format!("{:?}", join_err);
                let reason = describe_join_error(join_err);
                self.memory
                    .log(MemoryLevel::Error, &format!("Loop error: {}", reason));
                error!(
                    "Planner loop error in iteration {}: {} ({})",
                    iteration, reason, detail
                );
                IterationOutcome::Failed
            }
        };

        if let Some(hook) = &self.hook {
            if let SelfImproveOutcome::Completed(_) =
                hook.invoker.run_once(&hook.script, hook.seed.as_deref()).await
            {
                info!("Self-improvement run after iteration {} complete", iteration);
            }
        }

        outcome
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        format!("planner panicked: {}", panic_message(err.into_panic()))
    } else {
        format!("planner task failed: {}", err)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::testing::RecordingMemory;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Planner that fails on the listed call numbers (1-based)
    struct ScriptedPlanner {
        calls: AtomicU32,
        fail_on: Vec<u32>,
    }

    impl ScriptedPlanner {
        fn new(fail_on: Vec<u32>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_on,
            })
        }
    }

    #[async_trait]
    impl Planner for ScriptedPlanner {
        async fn loop_once(&self) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                Err(anyhow!("planner exploded on call {}", call))
            } else {
                Ok(())
            }
        }
    }

    struct PanickingPlanner;

    #[async_trait]
    impl Planner for PanickingPlanner {
        async fn loop_once(&self) -> anyhow::Result<()> {
            panic!("index out of range");
        }
    }

    #[tokio::test]
    async fn test_success_records_nothing_to_memory() {
        let memory = RecordingMemory::new_shared();
        let mut executor = IterationExecutor::new(ScriptedPlanner::new(vec![]), memory.clone());

        assert_eq!(executor.run_once().await, IterationOutcome::Succeeded);
        assert_eq!(executor.iterations(), 1);
        assert!(memory.entries().is_empty());
    }

    #[tokio::test]
    async fn test_planner_error_is_contained_and_recorded() {
        let memory = RecordingMemory::new_shared();
        let mut executor =
            IterationExecutor::new(ScriptedPlanner::new(vec![1]), memory.clone());

        assert_eq!(executor.run_once().await, IterationOutcome::Failed);
        assert_eq!(executor.run_once().await, IterationOutcome::Succeeded);

        let entries = memory.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, MemoryLevel::Error);
        assert_eq!(entries[0].1, "Loop error: planner exploded on call 1");
    }

    #[tokio::test]
    async fn test_planner_panic_is_contained() {
        let memory = RecordingMemory::new_shared();
        let mut executor = IterationExecutor::new(Arc::new(PanickingPlanner), memory.clone());

        assert_eq!(executor.run_once().await, IterationOutcome::Failed);

        let entries = memory.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.contains("index out of range"));
    }

    #[tokio::test]
    async fn test_join_error_description_carries_panic_message() {
        let join_err = tokio::spawn(async { panic!("bad plan {}", 7) })
            .await
            .unwrap_err();

        let detail = format!("{:?}", join_err);
        let reason = describe_join_error(join_err);

        assert_eq!(reason, "planner panicked: bad plan 7");
        assert!(detail.contains("Panic"));
    }

    #[tokio::test]
    async fn test_missing_hook_script_does_not_change_classification() {
        let dir = tempfile::tempdir().unwrap();
        let memory = RecordingMemory::new_shared();
        let hook = SelfImproveHook {
            invoker: SelfImproveInvoker::new(Some("sh".to_string())),
            script: dir.path().join("missing.sh"),
            seed: None,
        };

        let mut ok = IterationExecutor::new(ScriptedPlanner::new(vec![]), memory.clone())
            .with_self_improve(hook.clone());
        assert_eq!(ok.run_once().await, IterationOutcome::Succeeded);

        let mut failing = IterationExecutor::new(ScriptedPlanner::new(vec![1]), memory.clone())
            .with_self_improve(hook);
        assert_eq!(failing.run_once().await, IterationOutcome::Failed);

        assert_eq!(memory.count(MemoryLevel::Error), 1);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_hook_runs_after_failed_step() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = dir.path().join("improve.sh");
        std::fs::write(&script, format!("touch {}\n", marker.display())).unwrap();

        let memory = RecordingMemory::new_shared();
        let mut executor = IterationExecutor::new(ScriptedPlanner::new(vec![1]), memory.clone())
            .with_self_improve(SelfImproveHook {
                invoker: SelfImproveInvoker::new(Some("sh".to_string())),
                script,
                seed: None,
            });

        assert_eq!(executor.run_once().await, IterationOutcome::Failed);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_fail_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("improve.sh");
        std::fs::write(&script, "exit 9\n").unwrap();

        let memory = RecordingMemory::new_shared();
        let mut executor = IterationExecutor::new(ScriptedPlanner::new(vec![]), memory.clone())
            .with_self_improve(SelfImproveHook {
                invoker: SelfImproveInvoker::new(Some("sh".to_string())),
                script,
                seed: None,
            });

        assert_eq!(executor.run_once().await, IterationOutcome::Succeeded);
        assert!(memory.entries().is_empty());
    }
}
