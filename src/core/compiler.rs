//! Job compiler - flattens a validated graph into an executable job list

use super::graph::{JobType, NodeKind, WorkflowGraph};
use crate::error::GraphError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outgoing link of a compiled job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub target_id: String,
    pub condition: String,
}

/// Incoming link of a compiled job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub source_id: String,
    pub condition: String,
}

/// An executable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub is_conditional: bool,
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
}

fn default_true() -> bool {
    true
}

impl Job {
    pub fn job_type(&self) -> JobType {
        self.kind.job_type()
    }
}

/// Run metadata emitted alongside the jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFlow {
    pub start_node: Option<String>,
    pub total_jobs: usize,
    pub has_conditional_flow: bool,
}

/// The compiled job document consumed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledWorkflow {
    #[serde(default)]
    pub name: String,
    pub jobs: Vec<Job>,
    pub execution_flow: ExecutionFlow,
}

impl CompiledWorkflow {
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Load a compiled document; `.json` files are read as JSON, anything else as YAML
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading compiled workflow {}", path.display()))?;
        let workflow = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(workflow)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Validate `graph` and compile it. Invalid graphs are rejected with every error found.
pub fn compile(graph: &WorkflowGraph) -> Result<CompiledWorkflow, GraphError> {
    graph.validate().into_result()?;
    Ok(compile_unchecked(graph))
}

/// Compile without validating. Callers must have validated the graph already.
pub fn compile_unchecked(graph: &WorkflowGraph) -> CompiledWorkflow {
    let jobs: Vec<Job> = graph
        .nodes
        .iter()
        .map(|node| Job {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: node.kind.clone(),
            connections: graph
                .outgoing(&node.id)
                .into_iter()
                .map(|e| Connection {
                    target_id: e.target.clone(),
                    condition: e.branch().to_string(),
                })
                .collect(),
            dependencies: graph
                .incoming(&node.id)
                .into_iter()
                .map(|e| Dependency {
                    source_id: e.source.clone(),
                    condition: e.branch().to_string(),
                })
                .collect(),
            is_conditional: node.is_condition(),
            continue_on_error: node.continue_on_error,
        })
        .collect();

    let execution_flow = ExecutionFlow {
        start_node: graph.start_nodes().first().map(|n| n.id.clone()),
        total_jobs: jobs.len(),
        has_conditional_flow: jobs.iter().any(|j| j.is_conditional),
    };

    CompiledWorkflow {
        name: graph.name.clone(),
        jobs,
        execution_flow,
    }
}

impl WorkflowGraph {
    /// Validate and compile this graph
    pub fn compile(&self) -> Result<CompiledWorkflow, GraphError> {
        compile(self)
    }
}
