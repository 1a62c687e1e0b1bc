//! Jobflow - workflow graph engine
//!
//! Workflows are directed graphs of typed jobs (tasks, conditions, API calls,
//! scripts, emails). A graph is validated, compiled into a job list with
//! explicit dependencies, then executed concurrently with conditional routing.
//!
//! ```no_run
//! use jobflow::{Engine, EngineConfig, WorkflowGraph};
//!
//! # async fn demo() -> jobflow::Result<()> {
//! let graph = WorkflowGraph::from_file("onboarding.yml".as_ref())?;
//! let compiled = graph.compile()?;
//! let result = Engine::new(EngineConfig::default())
//!     .run(&compiled, Default::default())
//!     .await?;
//! println!("{}: {:?}", result.workflow, result.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod email;
pub mod error;
pub mod events;
pub mod handlers;
pub mod observer;
pub mod store;
pub mod template;

// Re-exports
pub use config::EngineConfig;
pub use core::{
    compile, CompiledWorkflow, Edge, Engine, Job, JobResult, JobStatus, JobType, Node, NodeKind,
    RunSummary, ValidationReport, WorkflowGraph, WorkflowResult, WorkflowStatus,
};
pub use email::{EmailMessage, EmailReceipt, EmailSender, OutboxSender};
pub use error::{EngineError, GraphError, JobExecutionError};
pub use events::{EventStream, RunEvent};
pub use observer::{LogObserver, NoopObserver, Observer, ObserverSet};
pub use store::RunStore;

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
