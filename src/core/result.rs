//! Run results - per-job outcomes and the whole-run record

use super::graph::JobType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Pruned by routing; the handler never ran
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a single job within one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: String,
    pub label: String,
    pub kind: JobType,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub logs: Vec<String>,
}

impl JobResult {
    pub fn pending(job_id: impl Into<String>, label: impl Into<String>, kind: JobType) -> Self {
        Self {
            job_id: job_id.into(),
            label: label.into(),
            kind,
            status: JobStatus::Pending,
            started_at: None,
            ended_at: None,
            result: None,
            error: None,
            logs: Vec::new(),
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn complete(&mut self, result: Value) {
        self.status = JobStatus::Completed;
        self.ended_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.ended_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub(crate) fn skip(&mut self) {
        self.status = JobStatus::Skipped;
        self.ended_at = Some(Utc::now());
    }

    /// Wall time spent in the handler, if it finished
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    /// `result.conditionResult` of a condition job
    pub fn condition_result(&self) -> Option<bool> {
        self.result
            .as_ref()
            .and_then(|r| r.get("conditionResult"))
            .and_then(Value::as_bool)
    }
}

/// Counts per job status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
}

/// Whole-run outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub id: String,
    pub workflow: String,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Job results in compile order
    pub job_results: Vec<JobResult>,
    /// Executed job ids in completion order
    pub executed: Vec<String>,
    pub log: Vec<String>,
}

impl WorkflowResult {
    pub fn new(workflow: impl Into<String>, job_results: Vec<JobResult>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow: workflow.into(),
            status: WorkflowStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            job_results,
            executed: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn job(&self, job_id: &str) -> Option<&JobResult> {
        self.job_results.iter().find(|j| j.job_id == job_id)
    }

    pub fn was_executed(&self, job_id: &str) -> bool {
        self.executed.iter().any(|id| id == job_id)
    }

    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<&JobResult> {
        self.job_results
            .iter()
            .filter(|j| j.status == status)
            .collect()
    }

    pub fn failed_jobs(&self) -> Vec<&JobResult> {
        self.jobs_with_status(JobStatus::Failed)
    }

    /// Jobs that never ran and were not pruned
    pub fn pending_jobs(&self) -> Vec<&JobResult> {
        self.jobs_with_status(JobStatus::Pending)
    }

    pub fn has_failures(&self) -> bool {
        self.job_results
            .iter()
            .any(|j| j.status == JobStatus::Failed)
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.job_results.len(),
            ..Default::default()
        };
        for job in &self.job_results {
            match job.status {
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Skipped => summary.skipped += 1,
                JobStatus::Pending | JobStatus::Running => summary.pending += 1,
            }
        }
        summary
    }

    pub(crate) fn seal(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_result_transitions() {
        let mut job = JobResult::pending("check", "Check", JobType::Condition);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.duration_ms().is_none());

        job.start();
        assert_eq!(job.status, JobStatus::Running);
        assert!(!job.status.is_terminal());

        job.complete(json!({ "conditionResult": true }));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.condition_result(), Some(true));
        assert!(job.duration_ms().unwrap() >= 0);
    }

    #[test]
    fn test_summary_counts() {
        let mut a = JobResult::pending("a", "a", JobType::Task);
        a.start();
        a.complete(json!({}));
        let mut b = JobResult::pending("b", "b", JobType::ApiCall);
        b.start();
        b.fail("boom".into());
        let mut c = JobResult::pending("c", "c", JobType::End);
        c.skip();
        let d = JobResult::pending("d", "d", JobType::End);

        let run = WorkflowResult::new("wf", vec![a, b, c, d]);
        let summary = run.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.pending, 1);
        assert!(run.has_failures());
        assert_eq!(run.failed_jobs()[0].job_id, "b");
        assert_eq!(run.pending_jobs()[0].job_id, "d");
    }

    #[test]
    fn test_job_results_serialize_as_ordered_list() {
        let run = WorkflowResult::new(
            "wf",
            vec![
                JobResult::pending("z", "z", JobType::Start),
                JobResult::pending("a", "a", JobType::End),
            ],
        );
        let value = serde_json::to_value(&run).unwrap();
        let ids: Vec<&str> = value["jobResults"]
            .as_array()
            .unwrap()
            .iter()
            .map(|j| j["jobId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["z", "a"]);
        assert_eq!(value["status"], "running");
    }
}
