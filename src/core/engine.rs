//! Execution engine - dependency-gated concurrent traversal of a compiled workflow
//!
//! A run starts at the start job and visits jobs along connections. Each visit
//! checks the job's dependencies under the run lock:
//!
//! - a dependency is *resolved* once its source has executed or been skipped
//! - it is *live* when the source executed and routed to this job
//! - all resolved with at least one live: the job is claimed and dispatched
//! - all resolved and none live: the job is skipped, and its targets are visited
//!   so the skip propagates
//! - anything unresolved: the visit returns, a later completion re-checks it
//!
//! Claiming happens under the lock before dispatch, so a job reached by several
//! branches at once runs exactly once. The lock is never held across an await
//! and observer hooks are called after it is released.

use super::compiler::{CompiledWorkflow, Job};
use super::graph::{DEFAULT_BRANCH, PORT_FALSE, PORT_OUT, PORT_TRUE};
use super::result::{JobResult, JobStatus, WorkflowResult, WorkflowStatus};
use crate::config::EngineConfig;
use crate::email::EmailSender;
use crate::error::EngineError;
use crate::handlers::{self, JobContext};
use crate::observer::{NoopObserver, Observer};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Runs compiled workflows
pub struct Engine {
    config: Arc<EngineConfig>,
    http: reqwest::Client,
    email: Option<Arc<dyn EmailSender>>,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();
        Self {
            config: Arc::new(config),
            http,
            email: None,
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    /// Sender used by SendEmail jobs. Without one they fail.
    pub fn with_email_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that cancels every run of this engine
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new jobs. Running handlers are interrupted at their next
    /// await point; undispatched jobs stay pending.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Execute a workflow from its start job
    ///
    /// Job failures are recorded on the result and never abort the run. Only
    /// engine-level errors (no start job, a connection to an unknown job) are
    /// returned as `Err`.
    pub async fn run(
        &self,
        workflow: &CompiledWorkflow,
        variables: Map<String, Value>,
    ) -> Result<WorkflowResult, EngineError> {
        let job_results = workflow
            .jobs
            .iter()
            .map(|job| JobResult::pending(&job.id, &job.label, job.job_type()))
            .collect();
        let mut record = WorkflowResult::new(&workflow.name, job_results);

        let start = match workflow.execution_flow.start_node.as_deref() {
            Some(id) if workflow.job(id).is_some() => id.to_string(),
            _ => {
                // Observers always see the run open before it closes
                self.observer.on_workflow_update(&record);
                record.log.push(EngineError::NoStartJob.to_string());
                record.seal(WorkflowStatus::Failed);
                self.observer.on_workflow_update(&record);
                return Err(EngineError::NoStartJob);
            }
        };

        log::info!(
            "🚀 Running workflow {} ({} jobs, run {})",
            workflow.name,
            workflow.jobs.len(),
            record.id
        );
        record.log.push(format!("run started at {}", start));
        self.observer.on_workflow_update(&record);

        let index = workflow
            .jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (job.id.clone(), i))
            .collect();
        let run = Arc::new(Run {
            jobs: workflow
                .jobs
                .iter()
                .map(|job| (job.id.clone(), job.clone()))
                .collect(),
            variables,
            config: self.config.clone(),
            http: self.http.clone(),
            email: self.email.clone(),
            observer: self.observer.clone(),
            cancel: self.cancel.child_token(),
            state: Mutex::new(RunState {
                record,
                index,
                claimed: HashSet::new(),
                executed: HashSet::new(),
                skipped: HashSet::new(),
                routes: HashMap::new(),
            }),
        });

        let outcome = run.clone().visit(start).await;
        let mut record = run.finish();

        match outcome {
            Ok(()) => {
                let status = if run.cancel.is_cancelled() && !record.pending_jobs().is_empty() {
                    WorkflowStatus::Cancelled
                } else {
                    WorkflowStatus::Completed
                };
                record.log.push(format!("run {}", status));
                record.seal(status);
                self.observer.on_workflow_update(&record);
                Ok(record)
            }
            Err(e) => {
                log::error!("Workflow {} aborted: {}", workflow.name, e);
                record.log.push(format!("run aborted: {}", e));
                record.seal(WorkflowStatus::Failed);
                self.observer.on_workflow_update(&record);
                Err(e)
            }
        }
    }
}

/// Mutable bookkeeping of one run, guarded by a single lock
struct RunState {
    record: WorkflowResult,
    /// Job id -> position in `record.job_results`
    index: HashMap<String, usize>,
    claimed: HashSet<String>,
    executed: HashSet<String>,
    skipped: HashSet<String>,
    /// Executed job id -> targets it routed to
    routes: HashMap<String, HashSet<String>>,
}

impl RunState {
    fn job_mut(&mut self, id: &str) -> Option<&mut JobResult> {
        let i = *self.index.get(id)?;
        self.record.job_results.get_mut(i)
    }

    fn job(&self, id: &str) -> Option<&JobResult> {
        let i = *self.index.get(id)?;
        self.record.job_results.get(i)
    }
}

/// Outcome of checking a job's dependencies
enum Gate {
    /// Already claimed by another visit
    Claimed,
    Waiting(Vec<String>),
    Cancelled,
    Skipped(JobResult),
    Ready(Box<Dispatch>),
}

/// What a claimed job needs to run
struct Dispatch {
    snapshot: JobResult,
    context: Value,
    results: Map<String, Value>,
    warnings: Vec<String>,
}

struct Run {
    jobs: HashMap<String, Job>,
    variables: Map<String, Value>,
    config: Arc<EngineConfig>,
    http: reqwest::Client,
    email: Option<Arc<dyn EmailSender>>,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
    state: Mutex<RunState>,
}

impl Run {
    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Visit a job, then every job it connects to
    fn visit(self: Arc<Self>, id: String) -> BoxFuture<'static, Result<(), EngineError>> {
        async move {
            let job = self
                .jobs
                .get(&id)
                .ok_or_else(|| EngineError::JobNotFound(id.clone()))?;

            match self.gate(job) {
                Gate::Claimed | Gate::Cancelled => return Ok(()),
                Gate::Waiting(on) => {
                    log::debug!("{} waiting on {}", id, on.join(", "));
                    return Ok(());
                }
                Gate::Skipped(snapshot) => self.observer.on_job_update(&snapshot),
                Gate::Ready(dispatch) => self.dispatch(job, *dispatch).await,
            }

            // Every target is visited, routed or not: unrouted ones are pruned there
            let mut seen = HashSet::new();
            let visits: Vec<_> = job
                .connections
                .iter()
                .filter(|c| seen.insert(c.target_id.as_str()))
                .map(|c| self.clone().visit(c.target_id.clone()))
                .collect();

            // Let every branch finish before surfacing the first engine error
            join_all(visits).await.into_iter().collect::<Result<Vec<_>, _>>()?;
            Ok(())
        }
        .boxed()
    }

    fn gate(&self, job: &Job) -> Gate {
        let mut guard = self.state();
        let state = &mut *guard;
        if state.claimed.contains(&job.id) {
            return Gate::Claimed;
        }

        let mut waiting = Vec::new();
        let mut live = 0;
        let mut warnings = Vec::new();
        for dep in &job.dependencies {
            if state.executed.contains(&dep.source_id) {
                let routed = state
                    .routes
                    .get(&dep.source_id)
                    .is_some_and(|targets| targets.contains(&job.id));
                if routed {
                    live += 1;
                    if state.job(&dep.source_id).map(|j| j.status) == Some(JobStatus::Failed) {
                        warnings.push(format!(
                            "warning: dependency {} failed, continuing",
                            dep.source_id
                        ));
                    }
                }
            } else if !state.skipped.contains(&dep.source_id) {
                waiting.push(dep.source_id.clone());
            }
        }
        if !waiting.is_empty() {
            return Gate::Waiting(waiting);
        }

        if !job.dependencies.is_empty() && live == 0 {
            state.claimed.insert(job.id.clone());
            state.skipped.insert(job.id.clone());
            state.record.log.push(format!("{} skipped: no live dependency", job.id));
            return match state.job_mut(&job.id) {
                Some(result) => {
                    result.skip();
                    Gate::Skipped(result.clone())
                }
                None => Gate::Claimed,
            };
        }

        if self.cancel.is_cancelled() {
            return Gate::Cancelled;
        }

        state.claimed.insert(job.id.clone());
        let (context, results) = self.evaluation_context(state);
        state.record.log.push(format!("{} started", job.id));
        let Some(result) = state.job_mut(&job.id) else {
            return Gate::Claimed;
        };
        result.start();
        result.logs.extend(warnings.iter().cloned());

        Gate::Ready(Box::new(Dispatch {
            snapshot: result.clone(),
            context,
            results,
            warnings,
        }))
    }

    /// Run variables plus every finished job's result, by id and by `<kind>_result`
    fn evaluation_context(&self, state: &RunState) -> (Value, Map<String, Value>) {
        let mut context = self.variables.clone();
        let mut results = Map::new();
        for id in &state.record.executed {
            let Some(job) = state.job(id) else { continue };
            let Some(result) = &job.result else { continue };
            context.insert(id.clone(), result.clone());
            context.insert(format!("{}_result", job.kind), result.clone());
            results.insert(id.clone(), result.clone());
        }
        (Value::Object(context), results)
    }

    async fn dispatch(&self, job: &Job, dispatch: Dispatch) {
        self.observer.on_job_update(&dispatch.snapshot);
        for warning in &dispatch.warnings {
            log::warn!("⚠️  {}: {}", job.id, warning);
        }

        let mut ctx = JobContext::new(&job.id, self.config.clone());
        ctx.label = job.label.clone();
        ctx.context = dispatch.context;
        ctx.results = dispatch.results;
        ctx.variables = self.variables.clone();
        ctx.http = self.http.clone();
        ctx.email = self.email.clone();
        ctx.cancel = self.cancel.clone();

        let outcome = handlers::execute(job, &mut ctx).await;
        let logs = ctx.into_logs();

        let snapshot = {
            let mut guard = self.state();
            let state = &mut *guard;
            let Some(result) = state.job_mut(&job.id) else {
                return;
            };
            result.logs.extend(logs);
            match outcome {
                Ok(value) => result.complete(value),
                Err(e) => result.fail(e.to_string()),
            }
            let snapshot = result.clone();

            let routes = routes_for(job, &snapshot);
            state.record.log.push(match &snapshot.error {
                Some(error) => format!("{} failed: {}", job.id, error),
                None => format!("{} completed", job.id),
            });
            state.executed.insert(job.id.clone());
            state.record.executed.push(job.id.clone());
            state.routes.insert(job.id.clone(), routes);
            snapshot
        };
        self.observer.on_job_update(&snapshot);
    }

    /// Final copy of the record, with never-run jobs noted in the log
    fn finish(&self) -> WorkflowResult {
        let state = self.state();
        let mut record = state.record.clone();
        for job in state.record.pending_jobs() {
            record.log.push(format!("{} never ran", job.job_id));
        }
        record
    }
}

/// Targets a finished job routes to
///
/// Condition jobs follow the branch matching their boolean result; other jobs
/// follow their plain outputs. A failed job with `continue_on_error` off
/// routes nowhere.
fn routes_for(job: &Job, result: &JobResult) -> HashSet<String> {
    if result.status == JobStatus::Failed && !job.continue_on_error {
        return HashSet::new();
    }

    let branch = if job.is_conditional {
        match result.condition_result() {
            Some(true) => PORT_TRUE,
            Some(false) => PORT_FALSE,
            None => return HashSet::new(),
        }
    } else {
        PORT_OUT
    };

    job.connections
        .iter()
        .filter(|c| {
            c.condition == branch || (!job.is_conditional && c.condition == DEFAULT_BRANCH)
        })
        .map(|c| c.target_id.clone())
        .collect()
}
