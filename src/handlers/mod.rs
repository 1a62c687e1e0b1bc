//! Job handlers - one per job kind
//!
//! The engine calls [`execute`], which matches exhaustively on the job's kind.
//! Handlers return the job's result payload or a [`JobExecutionError`]; they
//! never touch the run state directly.

mod api_call;
mod condition;
mod end;
mod script;
mod send_email;
mod start;
mod task;

pub use condition::evaluate_rule;

use crate::config::EngineConfig;
use crate::core::{Job, NodeKind};
use crate::email::EmailSender;
use crate::error::JobExecutionError;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a handler may read while running one job
pub struct JobContext {
    pub job_id: String,
    pub label: String,
    /// Run variables merged with prior job results (by id and `<kind>_result`)
    pub context: Value,
    /// Prior job results keyed by job id
    pub results: Map<String, Value>,
    pub variables: Map<String, Value>,
    pub config: Arc<EngineConfig>,
    pub http: reqwest::Client,
    pub email: Option<Arc<dyn EmailSender>>,
    pub cancel: CancellationToken,
    logs: Vec<String>,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, config: Arc<EngineConfig>) -> Self {
        let job_id = job_id.into();
        Self {
            label: job_id.clone(),
            job_id,
            context: Value::Object(Map::new()),
            results: Map::new(),
            variables: Map::new(),
            config,
            http: reqwest::Client::new(),
            email: None,
            cancel: CancellationToken::new(),
            logs: Vec::new(),
        }
    }

    /// Append a line to this job's log
    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn into_logs(self) -> Vec<String> {
        self.logs
    }
}

/// Run the handler for `job`
pub async fn execute(job: &Job, ctx: &mut JobContext) -> Result<Value, JobExecutionError> {
    match &job.kind {
        NodeKind::Start(attrs) => Ok(start::execute(attrs, ctx)),
        NodeKind::Task(attrs) => Ok(task::execute(attrs, ctx)),
        NodeKind::Condition(attrs) => Ok(condition::execute(attrs, ctx)),
        NodeKind::ApiCall(attrs) => api_call::execute(attrs, ctx).await,
        NodeKind::Script(attrs) => script::execute(attrs, ctx).await,
        NodeKind::SendEmail(attrs) => send_email::execute(attrs, ctx).await,
        NodeKind::End(attrs) => Ok(end::execute(attrs, ctx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EndAttrs, ScriptAttrs};

    fn job(kind: NodeKind) -> Job {
        Job {
            id: "job".into(),
            label: "Job".into(),
            kind,
            connections: Vec::new(),
            dependencies: Vec::new(),
            is_conditional: false,
            continue_on_error: true,
        }
    }

    #[test]
    fn test_dispatch_by_kind() {
        let mut ctx = JobContext::new("job", Arc::new(EngineConfig::default()));
        ctx.context = serde_json::json!({ "who": "ops" });
        let end = job(NodeKind::End(EndAttrs {
            status: "success".into(),
            message: Some("handed to {{who}}".into()),
        }));

        let result = tokio_test::block_on(execute(&end, &mut ctx)).unwrap();
        assert_eq!(result["message"], "handed to ops");
        assert_eq!(ctx.logs(), ["Reached end (success)"]);
    }

    #[test]
    fn test_handler_errors_are_returned() {
        let mut ctx = JobContext::new("job", Arc::new(EngineConfig::default()));
        let script = job(NodeKind::Script(ScriptAttrs {
            language: "python".into(),
            code: "print(1)".into(),
            ..Default::default()
        }));

        let err = tokio_test::block_on(execute(&script, &mut ctx)).unwrap_err();
        assert!(matches!(err, JobExecutionError::UnsupportedLanguage(_)));
    }
}
