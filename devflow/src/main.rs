//! `devflow` command-line interface.
//!
//! Runs a workflow document through the engine, prints one line per envelope
//! and reports the final status through the exit code.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use devflow::{Engine, WorkflowError};
use devflow::core::transitions::TransitionTable;
use devflow::exit_codes;
use devflow::graph::Graph;
use devflow::io::backend::{backend_from_config, resolve_backend_config};
use devflow::io::config::{DEFAULT_CONFIG_FILE, load_config};
use devflow::io::graph_store::{load_workflow, render_nodes_yaml};
use devflow::io::oracle::oracle_from_config;
use devflow::io::run_log::{RunLog, RunSummary};
use devflow::logging;

#[derive(Parser)]
#[command(
    name = "devflow",
    version,
    about = "Node-graph workflow engine for a simulated development pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workflow document until it finishes, terminates or stalls.
    Run {
        /// Workflow document (YAML or JSON).
        workflow: PathBuf,
        /// Engine config (TOML). Defaults to `devflow.toml` when present.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Seed for the random oracle; overrides `oracle.seed`.
        #[arg(long)]
        seed: Option<u64>,
        /// Write `envelopes.jsonl` and `summary.json` into this directory.
        #[arg(long)]
        run_dir: Option<PathBuf>,
    },
    /// Load a workflow document and check it against the decision table.
    Validate {
        workflow: PathBuf,
    },
    /// Print the node list of a workflow document as YAML.
    Nodes {
        workflow: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            workflow,
            config,
            seed,
            run_dir,
        } => cmd_run(&workflow, config.as_deref(), seed, run_dir.as_deref()),
        Command::Validate { workflow } => cmd_validate(&workflow),
        Command::Nodes { workflow } => cmd_nodes(&workflow),
    }
}

fn cmd_run(
    workflow: &Path,
    config: Option<&Path>,
    seed: Option<u64>,
    run_dir: Option<&Path>,
) -> Result<i32> {
    let config_path = config.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    let cfg = load_config(config_path)?;
    debug!(config = %config_path.display(), ?cfg, "loaded engine config");

    let definition =
        load_workflow(workflow).with_context(|| format!("load workflow {}", workflow.display()))?;
    let backend_cfg = resolve_backend_config(&cfg.backend, &definition.initial_state.rpc);
    let backend = backend_from_config(&backend_cfg)?;
    let oracle = oracle_from_config(&cfg.oracle, seed);
    let mut engine = Engine::new(definition, backend, oracle)
        .with_context(|| format!("load workflow {}", workflow.display()))?
        .with_max_steps(cfg.max_steps);

    let mut log = run_dir.map(RunLog::create).transpose()?;
    let mut log_error = None;
    let outcome = engine.run_with(|envelope| {
        println!("[{}] {}", envelope.node_name, envelope.headline());
        if let Some(log) = log.as_mut()
            && log_error.is_none()
            && let Err(err) = log.append(envelope)
        {
            log_error = Some(err);
        }
    })?;
    if let Some(err) = log_error {
        return Err(err);
    }

    if let Some(log) = &log {
        let path = log.write_summary(&RunSummary {
            workflow_name: &engine.graph().meta().workflow_name,
            status: outcome.status,
            master_decisions: outcome.master_decisions,
            sub_executions: outcome.sub_executions,
            state: engine.state(),
        })?;
        debug!(path = %path.display(), "wrote run summary");
    }

    println!("status: {}", outcome.status);
    Ok(exit_codes::for_status(outcome.status))
}

fn cmd_validate(workflow: &Path) -> Result<i32> {
    let definition = load_workflow(workflow)?;
    let graph = Graph::new(definition.meta, definition.nodes)?;
    if graph.master().is_none() {
        return Err(WorkflowError::MasterNodeMissing(graph.master_id().to_string()).into());
    }

    let unknown = TransitionTable::pipeline().unknown_targets(&graph);
    for id in &unknown {
        println!("warning: decision table references undeclared node '{id}'");
    }
    println!("ok: {} nodes, master '{}'", graph.len(), graph.master_id());
    Ok(exit_codes::OK)
}

fn cmd_nodes(workflow: &Path) -> Result<i32> {
    let definition = load_workflow(workflow)?;
    print!("{}", render_nodes_yaml(&definition.nodes)?);
    Ok(exit_codes::OK)
}
