//! Income Orchestrator: a long-running loop that runs a planner on a fixed
//! cadence, isolates failures per iteration, and stops cleanly on SIGINT or
//! SIGTERM.
//!
//! The planner and memory are collaborators behind narrow traits; this crate
//! provides the scheduling, failure isolation, shutdown protocol and the
//! optional self-improvement hook around them.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod process;
pub mod scheduler;
pub mod self_improve;
pub mod shutdown;

pub use config::Config;
pub use error::{OrchestratorError, Result};
pub use executor::{IterationExecutor, IterationOutcome};
pub use memory::{Memory, MemoryLevel};
pub use orchestrator::{DriverState, Orchestrator, RunSummary};
pub use planner::Planner;
pub use scheduler::Scheduler;
pub use self_improve::{SelfImproveInvoker, SelfImproveOutcome};
pub use shutdown::StopSignal;
