//! Error types for graph validation, engine runs and job handlers

use thiserror::Error;

/// Graph invariant violations. Any of these blocks execution entirely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("workflow has no start node")]
    NoStartNode,

    #[error("workflow has {} start nodes ({}), expected exactly one", .0.len(), .0.join(", "))]
    MultipleStartNodes(Vec<String>),

    #[error("start node {0} cannot have incoming edges")]
    StartHasIncoming(String),

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("duplicate edge id: {0}")]
    DuplicateEdge(String),

    #[error("edge {edge} references unknown node {node}")]
    UnknownNode { edge: String, node: String },

    #[error("node {node} has no {direction} port named {port}")]
    UnknownPort {
        node: String,
        port: String,
        direction: &'static str,
    },

    #[error("self-loop on node {0}")]
    SelfLoop(String),

    #[error("input port {port} on node {node} is already connected")]
    InputPortOccupied { node: String, port: String },

    #[error("branch port {port} on condition node {node} already has an outgoing edge")]
    BranchPortOccupied { node: String, port: String },

    #[error("node {node} has multiple non-conditional parents: {}", .parents.join(", "))]
    MultipleParents { node: String, parents: Vec<String> },

    #[error("cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    #[error("connecting {from} -> {to} would create a cycle")]
    WouldCreateCycle { from: String, to: String },

    #[error("graph is invalid: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<GraphError>),
}

/// Engine-level errors. These are the only errors allowed to abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("no start job in compiled workflow")]
    NoStartJob,

    #[error("job {0} not found in compiled workflow")]
    JobNotFound(String),
}

/// A handler-level failure. Always recorded on the job's result, never propagated
/// past the job boundary.
#[derive(Debug, Error)]
pub enum JobExecutionError {
    #[error("{handler}: timed out after {timeout_ms}ms")]
    Timeout {
        handler: &'static str,
        timeout_ms: u64,
    },

    #[error("{0}: cancelled")]
    Cancelled(&'static str),

    #[error("api call: {method} {url} returned HTTP {status}: {body}")]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("api call: network unreachable for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("api call: request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("script: unsupported language '{0}' (only 'shell' is supported)")]
    UnsupportedLanguage(String),

    #[error("script: failed to start: {0}")]
    ScriptSpawn(String),

    #[error("script: exited with code {code}: {stderr}")]
    ScriptFailed { code: i32, stderr: String },

    #[error("send email: no email sender configured")]
    MissingEmailSender,

    #[error("send email: delivery failed: {0}")]
    Delivery(String),

    #[error("{handler}: invalid attributes: {reason}")]
    InvalidAttributes {
        handler: &'static str,
        reason: String,
    },
}

impl JobExecutionError {
    /// Whether this failure was caused by a handler's own hard timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn invalid(handler: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidAttributes {
            handler,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_is_distinct() {
        let timeout = JobExecutionError::Timeout {
            handler: "script",
            timeout_ms: 1000,
        };
        let network = JobExecutionError::Network {
            url: "http://127.0.0.1:1".into(),
            reason: "connection refused".into(),
        };
        assert!(timeout.is_timeout());
        assert!(!network.is_timeout());
        assert!(timeout.to_string().contains("timed out"));
        assert!(network.to_string().contains("unreachable"));
    }

    #[test]
    fn test_invalid_lists_every_error() {
        let err = GraphError::Invalid(vec![
            GraphError::NoStartNode,
            GraphError::SelfLoop("a".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("no start node"));
        assert!(msg.contains("self-loop on node a"));
    }
}
