use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::executor::{IterationExecutor, IterationOutcome, SelfImproveHook};
use crate::memory::{Memory, MemoryLevel};
use crate::planner::Planner;
use crate::scheduler::Scheduler;
use crate::self_improve::SelfImproveInvoker;
use crate::shutdown::StopSignal;

/// Sleep between ticks; bounds how long a stop request goes unnoticed
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Running,
    Stopped,
}

/// Totals reported once the driver stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Iterations that invoked the planner
    pub iterations: u64,
    /// Iterations whose planner step failed
    pub failures: u64,
}

/// Main driver: polls the schedule, runs due iterations one at a time, and
/// stops at the first tick after the stop signal is set
pub struct Orchestrator {
    config: Arc<Config>,
    executor: IterationExecutor,
    memory: Arc<dyn Memory>,
    scheduler: Scheduler,
    stop: StopSignal,
    tick: Duration,
    state: DriverState,
    summary: RunSummary,
}

impl Orchestrator {
    /// Create a driver; the first iteration is due one interval from now
    pub fn new(
        config: Config,
        planner: Arc<dyn Planner>,
        memory: Arc<dyn Memory>,
        stop: StopSignal,
    ) -> Self {
        let mut executor = IterationExecutor::new(planner, Arc::clone(&memory));
        if config.self_improve_each_loop {
            executor = executor.with_self_improve(SelfImproveHook {
                invoker: SelfImproveInvoker::new(config.self_improve_interpreter.clone()),
                script: config.self_improve_script.clone(),
                seed: config.self_improve_seed.clone(),
            });
        }

        Self {
            scheduler: Scheduler::new(config.interval(), Instant::now()),
            config: Arc::new(config),
            executor,
            memory,
            stop,
            tick: DEFAULT_TICK,
            state: DriverState::Running,
            summary: RunSummary::default(),
        }
    }

    /// Override the sleep between ticks
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Log the startup line to the process log and memory
    pub fn announce(&self) {
        let message = format!(
            "Orchestrator starting (interval={} min, LLM={}, approvals={}, self_improve={})",
            self.config.interval_min,
            self.config.enable_llm,
            self.config.approvals_enforced,
            self.config.self_improve_each_loop
        );
        info!("{}", message);
        self.memory.log(MemoryLevel::Info, &message);
    }

    /// Run ticks until the stop signal is observed, then clean up
    pub async fn run(&mut self) -> RunSummary {
        while self.tick().await == DriverState::Running {}
        self.summary
    }

    /// One pass of the loop
    ///
    /// Stopping is only observed here, before any work starts; an iteration
    /// already under way always runs to completion.
    pub async fn tick(&mut self) -> DriverState {
        if self.state == DriverState::Stopped {
            return DriverState::Stopped;
        }

        if self.stop.is_set() {
            self.finish();
            return DriverState::Stopped;
        }

        if self.scheduler.is_due(Instant::now()) {
            let outcome = self.executor.run_once().await;
            self.summary.iterations += 1;
            if outcome == IterationOutcome::Failed {
                self.summary.failures += 1;
            }
            self.scheduler.mark_fired(Instant::now());
        }

        tokio::time::sleep(self.tick).await;
        DriverState::Running
    }

    fn finish(&mut self) {
        self.state = DriverState::Stopped;
        self.memory
            .log(MemoryLevel::Info, "Orchestrator stopped. Goodbye.");
        info!(
            "Stopped. ({} iterations, {} failed)",
            self.summary.iterations, self.summary.failures
        );
    }
}
