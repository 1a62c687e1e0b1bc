//! Run a workflow graph and stream its events
//!
//! Run with: cargo run --example run_workflow -- workflows/onboarding.yml plan=pro name=Ada

use anyhow::Result;
use jobflow::{
    Engine, EngineConfig, EventStream, LogObserver, ObserverSet, OutboxSender, WorkflowGraph,
};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let graph_path = PathBuf::from(
        args.next()
            .unwrap_or_else(|| "workflows/onboarding.yml".to_string()),
    );
    let mut variables = Map::new();
    for pair in args {
        if let Some((key, value)) = pair.split_once('=') {
            variables.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    println!("🚀 Loading {}\n", graph_path.display());
    let graph = WorkflowGraph::from_file(&graph_path)?;
    let compiled = graph.compile()?;
    println!("✅ Compiled {} jobs\n", compiled.jobs.len());

    let stream = EventStream::default();
    let mut rx = stream.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!("  {}", event.to_json_line());
        }
    });

    let outbox = std::env::temp_dir().join("jobflow-outbox");
    let engine = Engine::new(EngineConfig::default())
        .with_observer(Arc::new(ObserverSet::new().with(LogObserver).with(stream)))
        .with_email_sender(Arc::new(OutboxSender::new(&outbox)));

    let result = engine.run(&compiled, variables).await?;
    drop(engine);
    let _ = printer.await;

    let summary = result.summary();
    println!(
        "\n📊 {}: {} completed, {} failed, {} skipped, {} pending",
        result.status, summary.completed, summary.failed, summary.skipped, summary.pending
    );
    println!("📬 Emails written to {}", outbox.display());
    Ok(())
}
