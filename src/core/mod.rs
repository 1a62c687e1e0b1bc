//! Core engine - graph model, validation, compilation and execution

mod compiler;
mod engine;
mod graph;
mod result;
pub mod validator;

pub use compiler::{
    compile, compile_unchecked, CompiledWorkflow, Connection, Dependency, ExecutionFlow, Job,
};
pub use engine::Engine;
pub use graph::{
    ApiCallAttrs, ConditionAttrs, ConditionRule, Edge, EmailAttrs, EndAttrs, HttpMethod, JobType,
    Logic, Node, NodeKind, Operator, Port, PortDirection, Priority, ScriptAttrs, StartAttrs,
    TaskAttrs, WorkflowGraph, DEFAULT_BRANCH, PORT_FALSE, PORT_IN, PORT_OUT, PORT_TRUE,
};
pub use result::{JobResult, JobStatus, RunSummary, WorkflowResult, WorkflowStatus};
pub use validator::{validate_graph, ValidationReport};
