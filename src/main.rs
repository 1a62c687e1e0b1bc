//! Jobflow CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobflow::core::validator::{find_root_nodes, reachable_from, topological_order};
use jobflow::{
    CompiledWorkflow, Engine, EngineConfig, EventStream, LogObserver, ObserverSet, OutboxSender,
    RunStore, WorkflowGraph, WorkflowStatus,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "jobflow", version, about = "Validate, compile and run workflow graphs")]
struct Cli {
    /// Path to config file (default: ./jobflow.yml, then ~/.jobflow/config.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a graph document and report every problem found
    Validate {
        /// Graph document (YAML or JSON)
        graph: PathBuf,
    },
    /// Show roots, static order and reachability of a graph
    Inspect { graph: PathBuf },
    /// Compile a graph into a job document
    Compile {
        graph: PathBuf,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Execute a workflow
    Run {
        /// Graph document, or compiled job document with --compiled
        file: PathBuf,
        /// The file is an already compiled job document
        #[arg(long)]
        compiled: bool,
        /// Run variable as key=value (value parsed as JSON when possible)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
        /// Print run events as JSON lines instead of the final report
        #[arg(long)]
        events: bool,
        /// Save the run report to the runs directory
        #[arg(long)]
        save: bool,
        /// Deliver emails as JSON files into this directory
        #[arg(long)]
        outbox: Option<PathBuf>,
    },
    /// List saved run reports, most recent first
    Runs,
    /// Print a saved run report
    Show {
        /// Run name from `jobflow runs` (default: latest)
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { graph } => validate(&graph),
        Commands::Inspect { graph } => inspect(&graph),
        Commands::Compile { graph, output } => compile(&graph, output.as_deref()),
        Commands::Run {
            file,
            compiled,
            vars,
            events,
            save,
            outbox,
        } => {
            let config = EngineConfig::load(cli.config.as_deref())?;
            let workflow = if compiled {
                CompiledWorkflow::from_file(&file)?
            } else {
                load_graph(&file)?.compile()?
            };
            run(config, workflow, vars.into_iter().collect(), events, save, outbox).await
        }
        Commands::Runs => {
            let config = EngineConfig::load(cli.config.as_deref())?;
            list_runs(&RunStore::new(config.runs_dir))
        }
        Commands::Show { name } => {
            let config = EngineConfig::load(cli.config.as_deref())?;
            let store = RunStore::new(config.runs_dir);
            let result = match name {
                Some(name) => store.load(&name)?,
                None => store.load_latest()?,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

fn list_runs(store: &RunStore) -> Result<()> {
    let names = store.list()?;
    if names.is_empty() {
        println!("No saved runs in {}", store.dir().display());
        return Ok(());
    }
    for name in names {
        match store.load(&name) {
            Ok(result) => println!("{}  {}  {}", name, result.workflow, result.status),
            Err(e) => log::warn!("Skipping {}: {:#}", name, e),
        }
    }
    Ok(())
}

fn load_graph(path: &Path) -> Result<WorkflowGraph> {
    log::info!("Loading graph from: {}", path.display());
    let graph = WorkflowGraph::from_file(path)?;
    log::info!("Loaded {} nodes, {} edges", graph.nodes.len(), graph.edges.len());
    Ok(graph)
}

fn validate(path: &Path) -> Result<()> {
    let graph = load_graph(path)?;
    let report = graph.validate();

    for warning in &report.warnings {
        println!("⚠️  {}", warning);
    }
    for error in &report.errors {
        println!("✗ {}", error);
    }

    if !report.is_valid() {
        anyhow::bail!("{} is invalid ({} errors)", path.display(), report.errors.len());
    }
    println!("✓ {} is valid", path.display());
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let graph = load_graph(path)?;

    let roots: Vec<&str> = find_root_nodes(&graph.nodes, &graph.edges)
        .iter()
        .map(|n| n.id.as_str())
        .collect();
    println!("Roots: {}", roots.join(", "));

    match topological_order(&graph.nodes, &graph.edges) {
        Ok(order) => println!("Order: {}", order.join(" -> ")),
        Err(e) => println!("Order: unavailable ({})", e),
    }

    for start in graph.start_nodes() {
        println!(
            "Reachable from {}: {}",
            start.id,
            reachable_from(&graph.edges, &start.id).join(", ")
        );
    }
    Ok(())
}

fn compile(path: &Path, output: Option<&Path>) -> Result<()> {
    let compiled = load_graph(path)?.compile()?;
    let json = compiled.to_json()?;
    match output {
        Some(out) => {
            std::fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
            log::info!("Compiled {} jobs into {}", compiled.jobs.len(), out.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn run(
    config: EngineConfig,
    workflow: CompiledWorkflow,
    variables: Map<String, Value>,
    events: bool,
    save: bool,
    outbox: Option<PathBuf>,
) -> Result<()> {
    let runs_dir = config.runs_dir.clone();
    let mut observers = ObserverSet::new().with(LogObserver);

    let printer = if events {
        let stream = EventStream::default();
        let mut rx = stream.subscribe();
        observers.push(stream);
        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => println!("{}", event.to_json_line()),
                    Err(RecvError::Lagged(n)) => log::warn!("Dropped {} events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    } else {
        None
    };

    let mut engine = Engine::new(config).with_observer(Arc::new(observers));
    if let Some(dir) = outbox {
        engine = engine.with_email_sender(Arc::new(OutboxSender::new(dir)));
    }

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling run");
            token.cancel();
        }
    });

    let outcome = engine.run(&workflow, variables).await;
    // Closes the event stream so the printer drains and exits
    drop(engine);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let result = outcome?;
    if !events {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    if save {
        let path = RunStore::new(runs_dir).save(&result)?;
        log::info!("💾 Saved run report to {}", path.display());
    }

    if result.status == WorkflowStatus::Cancelled {
        anyhow::bail!("run {} was cancelled", result.id);
    }
    let failed = result.failed_jobs();
    if !failed.is_empty() {
        anyhow::bail!(
            "{} job(s) failed: {}",
            failed.len(),
            failed
                .iter()
                .map(|j| j.job_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
