//! Observer - callback surface notified of job and run state transitions
//!
//! Hooks are invoked synchronously by the engine, outside of its state lock.
//! Implementations should return quickly; anything slow belongs on another task.

use crate::core::{JobResult, JobStatus, WorkflowResult, WorkflowStatus};
use std::sync::Arc;

pub trait Observer: Send + Sync {
    fn on_job_update(&self, job: &JobResult);
    fn on_workflow_update(&self, workflow: &WorkflowResult);
}

impl<T: Observer + ?Sized> Observer for Arc<T> {
    fn on_job_update(&self, job: &JobResult) {
        (**self).on_job_update(job);
    }

    fn on_workflow_update(&self, workflow: &WorkflowResult) {
        (**self).on_workflow_update(workflow);
    }
}

/// Ignores every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_job_update(&self, _job: &JobResult) {}
    fn on_workflow_update(&self, _workflow: &WorkflowResult) {}
}

/// Writes transitions to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_job_update(&self, job: &JobResult) {
        match job.status {
            JobStatus::Pending => {}
            JobStatus::Running => log::info!("▶  {} [{}] started", job.job_id, job.kind),
            JobStatus::Completed => log::info!(
                "✓  {} completed in {}ms",
                job.job_id,
                job.duration_ms().unwrap_or_default()
            ),
            JobStatus::Failed => log::warn!(
                "✗  {} failed: {}",
                job.job_id,
                job.error.as_deref().unwrap_or("unknown error")
            ),
            JobStatus::Skipped => log::info!("⏭  {} skipped", job.job_id),
        }
    }

    fn on_workflow_update(&self, workflow: &WorkflowResult) {
        match workflow.status {
            WorkflowStatus::Running => {
                log::info!("🚀 Workflow {} started (run {})", workflow.workflow, workflow.id)
            }
            status => {
                let summary = workflow.summary();
                log::info!(
                    "Workflow {} {}: {} completed, {} failed, {} skipped, {} pending",
                    workflow.workflow,
                    status,
                    summary.completed,
                    summary.failed,
                    summary.skipped,
                    summary.pending
                );
            }
        }
    }
}

/// Fans every update out to several observers
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn Observer>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn push(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }
}

impl Observer for ObserverSet {
    fn on_job_update(&self, job: &JobResult) {
        for observer in &self.observers {
            observer.on_job_update(job);
        }
    }

    fn on_workflow_update(&self, workflow: &WorkflowResult) {
        for observer in &self.observers {
            observer.on_workflow_update(workflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobType;
    use std::sync::Mutex;

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Observer for Recorder {
        fn on_job_update(&self, job: &JobResult) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{}:{}", job.job_id, job.status));
        }

        fn on_workflow_update(&self, workflow: &WorkflowResult) {
            self.0
                .lock()
                .unwrap()
                .push(format!("wf:{}", workflow.status));
        }
    }

    #[test]
    fn test_observer_set_fans_out() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let set = ObserverSet::new()
            .with(Recorder(seen.clone()))
            .with(LogObserver)
            .with(Recorder(seen.clone()));

        let job = JobResult::pending("a", "a", JobType::Task);
        set.on_job_update(&job);
        set.on_workflow_update(&WorkflowResult::new("wf", vec![job]));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:pending", "a:pending", "wf:running", "wf:running"]
        );
    }
}
