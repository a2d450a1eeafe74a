use clap::Parser;
use colored::Colorize;
use tracing::error;

use income_orchestrator::config::Config;
use income_orchestrator::error::{OrchestratorError, Result};
use income_orchestrator::logging;
use income_orchestrator::memory::open_memory;
use income_orchestrator::orchestrator::{Orchestrator, RunSummary};
use income_orchestrator::planner::build_planner;
use income_orchestrator::shutdown::{self, StopSignal};

/// Income Orchestrator: run the planner on a fixed cadence until SIGINT/SIGTERM
///
/// All settings come from the environment (or a .env file in the working
/// directory): DB_PATH, CHECK_INTERVAL_MIN, ENABLE_LLM, ENFORCE_APPROVALS,
/// AUTO_PROCESS_ALL, SELF_IMPROVE_EACH_LOOP, SELF_IMPROVE_SCRIPT,
/// SELF_IMPROVE_INTERPRETER, SELF_IMPROVE_SEED, PLANNER_COMMAND, LOG_FILE,
/// LOG_TEE.
#[derive(Parser, Debug)]
#[command(name = "income-orchestrator")]
#[command(version, about, long_about = None)]
struct Cli {}

fn load_config() -> Result<Config> {
    // Values already in the environment win over the .env file
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(OrchestratorError::DotEnvError(e.to_string()));
        }
    }
    Config::from_env()
}

async fn run(config: Config) -> Result<RunSummary> {
    let stop = StopSignal::new();
    shutdown::install(stop.clone())?;

    let memory = open_memory(&config.db_path);
    let planner = build_planner(&config, memory.clone());

    let mut orchestrator = Orchestrator::new(config, planner, memory, stop);
    orchestrator.announce();
    Ok(orchestrator.run().await)
}

#[tokio::main]
async fn main() {
    let _cli = Cli::parse();

    // Logging is not up yet, so configuration errors go straight to stderr
    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "ERROR:".red().bold(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::setup_logging(&config) {
        eprintln!("{} {}", "ERROR:".red().bold(), e);
        std::process::exit(1);
    }

    match run(config).await {
        Ok(summary) => {
            println!(
                "\n{} Shutdown after {} iteration(s), {} failed",
                "STOPPED:".yellow().bold(),
                summary.iterations,
                summary.failures
            );
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
