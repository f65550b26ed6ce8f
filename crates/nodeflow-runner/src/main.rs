//! nodeflow-runner binary

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use nodeflow_engine::{EngineConfig, RunSupervisor};
use nodeflow_runner::{cases, host, CaseRunner, JsonLinesSink, Result, RunnerError};
use tokio::io::BufReader;

/// Execute push/pull node graphs
#[derive(Parser)]
#[command(name = "nodeflow-runner")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Await deadline in seconds for nodes without an explicit timeout
    #[arg(long, global = true)]
    await_timeout: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one graph file
    Run {
        /// Path to the graph JSON
        graph: PathBuf,

        /// Node to start from
        #[arg(short, long)]
        start: String,

        /// Run id (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Also print node waiting events
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run every test_*.json case in a directory
    Test {
        /// Directory holding the cases
        dir: PathBuf,

        /// Per-case deadline in seconds
        #[arg(long, default_value_t = 60.0)]
        timeout: f64,
    },

    /// Arm a graph's event nodes and read `<event_id> <payload>` lines from stdin
    Listen {
        /// Path to the graph JSON
        graph: PathBuf,
    },

    /// Print every registered node type as JSON
    Nodes,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunnerError::TestFailures { failed, total }) => {
            log::error!("{} of {} test case(s) failed", failed, total);
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let mut config = EngineConfig::from_env();
    if let Some(secs) = cli.await_timeout {
        config.default_await_timeout_secs = secs;
    }
    let registry = Arc::new(nodeflow_nodes::registry());

    match cli.command {
        Commands::Run {
            graph,
            start,
            run_id,
            verbose,
        } => {
            let graph = host::load_graph(&graph)?;
            let sink = Arc::new(JsonLinesSink { quiet: !verbose });
            let session = RunSupervisor::with_config(registry, sink, config);
            let outcome = host::run_graph(&session, &graph, &start, run_id).await?;
            session.shutdown().await;
            if outcome.is_success() {
                Ok(())
            } else {
                Err(RunnerError::RunUnsuccessful {
                    run_id: outcome.run_id,
                })
            }
        }
        Commands::Test { dir, timeout } => {
            let runner = CaseRunner::new(registry, config, nodeflow_engine::config::seconds(timeout));
            cases::run_directory(&runner, &dir).await.map(|_| ())
        }
        Commands::Listen { graph } => {
            let graph = host::load_graph(&graph)?;
            let session = RunSupervisor::with_config(registry, Arc::new(JsonLinesSink { quiet: true }), config);
            let delivered = host::listen(&session, &graph, BufReader::new(tokio::io::stdin())).await?;
            log::info!("Input closed after {} delivered event(s)", delivered);
            Ok(())
        }
        Commands::Nodes => {
            let mut blueprints = registry.blueprints();
            blueprints.sort_by(|a, b| a.node_type.cmp(&b.node_type));
            let json = serde_json::to_string_pretty(&blueprints)
                .map_err(|e| RunnerError::Engine(e.into()))?;
            println!("{}", json);
            Ok(())
        }
    }
}
