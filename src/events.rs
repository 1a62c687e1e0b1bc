//! Event streaming - JSON run events for UIs, relays and other consumers
//!
//! [`EventStream`] is an [`Observer`] that turns state transitions into
//! [`RunEvent`]s and broadcasts them to every subscriber.

use crate::core::{JobResult, JobStatus, JobType, RunSummary, WorkflowResult, WorkflowStatus};
use crate::observer::Observer;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    WorkflowStarted {
        run_id: String,
        workflow: String,
        total_jobs: usize,
    },
    JobStarted {
        job_id: String,
        kind: JobType,
    },
    JobCompleted {
        job_id: String,
        result: Option<serde_json::Value>,
        duration_ms: Option<i64>,
    },
    JobFailed {
        job_id: String,
        error: String,
    },
    JobSkipped {
        job_id: String,
    },
    WorkflowFinished {
        run_id: String,
        status: WorkflowStatus,
        summary: RunSummary,
    },
}

impl RunEvent {
    /// Event for a job transition; `None` for transitions that are not reported
    pub fn from_job(job: &JobResult) -> Option<Self> {
        let job_id = job.job_id.clone();
        match job.status {
            JobStatus::Pending => None,
            JobStatus::Running => Some(Self::JobStarted {
                job_id,
                kind: job.kind,
            }),
            JobStatus::Completed => Some(Self::JobCompleted {
                job_id,
                result: job.result.clone(),
                duration_ms: job.duration_ms(),
            }),
            JobStatus::Failed => Some(Self::JobFailed {
                job_id,
                error: job.error.clone().unwrap_or_default(),
            }),
            JobStatus::Skipped => Some(Self::JobSkipped { job_id }),
        }
    }

    pub fn from_workflow(workflow: &WorkflowResult) -> Self {
        match workflow.status {
            WorkflowStatus::Running => Self::WorkflowStarted {
                run_id: workflow.id.clone(),
                workflow: workflow.workflow.clone(),
                total_jobs: workflow.job_results.len(),
            },
            status => Self::WorkflowFinished {
                run_id: workflow.id.clone(),
                status,
                summary: workflow.summary(),
            },
        }
    }

    /// Serialize to JSON line
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Broadcast-based event stream for multiple consumers
pub struct EventStream {
    tx: broadcast::Sender<RunEvent>,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Observer for EventStream {
    fn on_job_update(&self, job: &JobResult) {
        if let Some(event) = RunEvent::from_job(job) {
            self.emit(event);
        }
    }

    fn on_workflow_update(&self, workflow: &WorkflowResult) {
        self.emit(RunEvent::from_workflow(workflow));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = RunEvent::JobStarted {
            job_id: "fetch".to_string(),
            kind: JobType::ApiCall,
        };
        let json = event.to_json_line();
        assert!(json.contains("\"type\":\"job_started\""));
        assert!(json.contains("\"kind\":\"api_call\""));
        assert!(json.contains("fetch"));
    }

    #[test]
    fn test_pending_jobs_are_not_reported() {
        let job = JobResult::pending("a", "a", JobType::Task);
        assert!(RunEvent::from_job(&job).is_none());
    }

    #[tokio::test]
    async fn test_stream_broadcasts_transitions() {
        let stream = EventStream::default();
        let mut rx = stream.subscribe();

        let mut job = JobResult::pending("a", "a", JobType::Task);
        job.start();
        stream.on_job_update(&job);
        job.complete(json!({ "ok": true }));
        stream.on_job_update(&job);

        let mut run = WorkflowResult::new("wf", vec![job]);
        run.seal(WorkflowStatus::Completed);
        stream.on_workflow_update(&run);

        assert!(matches!(rx.recv().await.unwrap(), RunEvent::JobStarted { .. }));
        match rx.recv().await.unwrap() {
            RunEvent::JobCompleted { result, .. } => assert_eq!(result, Some(json!({ "ok": true }))),
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            RunEvent::WorkflowFinished { status, summary, .. } => {
                assert_eq!(status, WorkflowStatus::Completed);
                assert_eq!(summary.completed, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
