//! Workflow Engine façade: the public run-control surface
//! (`create_run`/`start_run`/`execute_run`/`get_run`/`list_runs`/
//! `cancel_run`/`resume_run`/`retry_run`/`get_artifacts`/`get_history`) a
//! caller uses instead of reaching into `AppRunner`/`Scheduler` directly.
//!
//! Grounded on the teacher's `App::invoke`/`AppRunner` convenience layer for
//! the execution loop itself, and on the original Python `WorkflowEngine`'s
//! `execute`/`stream`/`get_state` for the shape of the operations (register
//! multiple named graphs, drive one to completion, expose state/history by
//! id) — collapsed here to the three graphs built in `graphs::pipeline` plus
//! one `Run` registry instead of a `Dict[str, StateGraph]`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, Notify, RwLock};
use uuid::Uuid;

use sha2::{Digest, Sha256};

use crate::artifact::Artifact;
use crate::channels::errors::{ErrorEvent, ErrorScope, LadderError};
use crate::channels::token_usage::TokenUsage;
use crate::error::{PipelineError, PipelineErrorKind};
use crate::event_bus::Event;
use crate::graphs::pipeline::{build_hotfix_graph, build_main_graph, build_parallel_development_graph};
use crate::node::StageExecutionMeta;
use crate::run::{AgentExecution, Run, RunStatus, StageOutcome, TaskKind};
use crate::runtimes::{AppRunner, Checkpoint, CheckpointerType, StepOptions, StepResult};
use crate::schedulers::SchedulerError;
use crate::state::{RunState, StateSnapshot};
use crate::subscription::SubscriptionHub;
use crate::types::{NodeKind, StageSlot};

/// Cooperative cancellation signal, checked between supersteps. Deliberately
/// hand-rolled (`Arc<AtomicBool>` + `Notify`) rather than pulling in
/// `tokio_util::CancellationToken` for one flag and one wakeup.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Which compiled graph a run executes against. `create_run` picks
/// [`GraphSelection::Hotfix`] for `TaskKind::Hotfix` and
/// [`GraphSelection::Main`] for everything else, matching
/// `TaskKind::skips_planning_and_review`; [`GraphSelection::ParallelDevelopment`]
/// is only reachable via [`PipelineEngine::create_run_with_graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphSelection {
    Main,
    Hotfix,
    ParallelDevelopment,
}

impl GraphSelection {
    fn for_task_kind(task_kind: TaskKind) -> Self {
        if task_kind.skips_planning_and_review() {
            GraphSelection::Hotfix
        } else {
            GraphSelection::Main
        }
    }
}

fn node_name_to_slot(name: &str) -> Option<StageSlot> {
    match name {
        "analyze_task" => Some(StageSlot::Analysis),
        "planning" => Some(StageSlot::Planning),
        "development" | "frontend_development" | "backend_development" | "infrastructure_development" | "merge_results" => {
            Some(StageSlot::Development)
        }
        "testing" => Some(StageSlot::Testing),
        "review" => Some(StageSlot::Review),
        "deployment" => Some(StageSlot::Deployment),
        "monitoring" => Some(StageSlot::Monitoring),
        _ => None,
    }
}

struct RunRecord {
    run: Run,
    graph: GraphSelection,
    cancellation: CancellationToken,
}

struct EngineInner {
    runners: FxHashMap<GraphSelection, Mutex<AppRunner>>,
    runs: RwLock<FxHashMap<Uuid, RunRecord>>,
    subscriptions: SubscriptionHub,
}

/// The crate's public run-control surface. Cheap to clone: internally an
/// `Arc`, so a clone can be handed to a spawned task driving a run in the
/// background while the original handle keeps answering `get_run`/`get_history`.
#[derive(Clone)]
pub struct PipelineEngine {
    inner: Arc<EngineInner>,
}

impl PipelineEngine {
    /// Compiles the three pipeline graphs and wires up a fresh, in-memory
    /// checkpointed runner for each. Use a durable `CheckpointerType` in
    /// production by constructing runners directly; this constructor is the
    /// convenient default for tests and single-process deployments.
    pub async fn new() -> Result<Self, PipelineError> {
        let main = build_main_graph()?;
        let hotfix = build_hotfix_graph()?;
        let parallel = build_parallel_development_graph()?;

        let mut runners = FxHashMap::default();
        runners.insert(
            GraphSelection::Main,
            Mutex::new(AppRunner::new(main, CheckpointerType::InMemory).await),
        );
        runners.insert(
            GraphSelection::Hotfix,
            Mutex::new(AppRunner::new(hotfix, CheckpointerType::InMemory).await),
        );
        runners.insert(
            GraphSelection::ParallelDevelopment,
            Mutex::new(AppRunner::new(parallel, CheckpointerType::InMemory).await),
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                runners,
                runs: RwLock::new(FxHashMap::default()),
                subscriptions: SubscriptionHub::default(),
            }),
        })
    }

    /// Registers a new run and its initial state, choosing the graph
    /// automatically from `task_kind`. Does not start execution; call
    /// [`start_run`](Self::start_run) or [`execute_run`](Self::execute_run).
    pub async fn create_run(
        &self,
        task_kind: TaskKind,
        requirements: impl Into<String>,
    ) -> Result<Uuid, PipelineError> {
        self.create_run_with_graph(task_kind, requirements, GraphSelection::for_task_kind(task_kind))
            .await
    }

    /// Like [`create_run`](Self::create_run) but with an explicit graph
    /// choice, for callers that want the parallel-development fan-out graph
    /// instead of the automatic hotfix/main selection.
    pub async fn create_run_with_graph(
        &self,
        task_kind: TaskKind,
        requirements: impl Into<String>,
        graph: GraphSelection,
    ) -> Result<Uuid, PipelineError> {
        let run = Run::new(task_kind);
        let run_id = run.id;
        let initial_state = RunState::builder_for(requirements.into(), task_kind).build();

        let runner = self
            .inner
            .runners
            .get(&graph)
            .expect("every GraphSelection variant has a registered runner");
        runner
            .lock()
            .await
            .create_session(run_id.to_string(), initial_state)
            .await
            .map_err(PipelineError::from)?;

        self.inner.subscriptions.connect(run_id).await;
        self.inner.runs.write().await.insert(
            run_id,
            RunRecord {
                run,
                graph,
                cancellation: CancellationToken::new(),
            },
        );

        Ok(run_id)
    }

    /// Transitions a pending/suspended run to `Running` and drives it to
    /// completion in a spawned background task. Returns as soon as the run
    /// has been scheduled, not when it finishes.
    pub async fn start_run(&self, run_id: Uuid) -> Result<(), PipelineError> {
        self.require_run(run_id).await?;
        let engine = self.clone();
        tokio::spawn(async move {
            let _ = engine.execute_run(run_id).await;
        });
        Ok(())
    }

    /// Drives `run_id` to completion, suspension, cancellation, or failure,
    /// awaiting the whole loop rather than spawning it. Safe to call
    /// directly when the caller wants to block on the result (tests,
    /// synchronous CLI usage); [`start_run`](Self::start_run) is the
    /// fire-and-forget variant.
    pub async fn execute_run(&self, run_id: Uuid) -> Result<RunStatus, PipelineError> {
        let (graph, cancellation) = {
            let mut runs = self.inner.runs.write().await;
            let record = runs
                .get_mut(&run_id)
                .ok_or_else(|| unknown_run(run_id))?;
            if record.run.status.is_terminal() {
                return Ok(record.run.status);
            }
            record.run.transition(RunStatus::Running);
            (record.graph, record.cancellation.clone())
        };

        let session_id = run_id.to_string();
        let runner = self
            .inner
            .runners
            .get(&graph)
            .expect("every GraphSelection variant has a registered runner");

        loop {
            if cancellation.is_cancelled() {
                self.finish_run(run_id, RunStatus::Cancelled).await;
                self.publish(run_id, Event::diagnostic("engine", "run cancelled"))
                    .await;
                return Ok(RunStatus::Cancelled);
            }

            let input_snapshot_digest = {
                let runner = runner.lock().await;
                runner
                    .get_session(&session_id)
                    .map(|session| snapshot_digest(&session.state.snapshot()))
                    .unwrap_or_default()
            };

            let step_started = std::time::Instant::now();
            let step_result = {
                let mut runner = runner.lock().await;
                runner.run_step(&session_id, StepOptions::default()).await
            };
            let step_duration_ms = step_started.elapsed().as_millis() as u64;

            let report = match step_result {
                Ok(StepResult::Completed(report)) => report,
                Ok(StepResult::Paused(_)) => {
                    self.finish_run(run_id, RunStatus::Suspended).await;
                    return Ok(RunStatus::Suspended);
                }
                Err(err) => {
                    let pipeline_err = PipelineError::from(err);
                    self.record_fatal_execution(run_id, &pipeline_err, input_snapshot_digest, step_duration_ms)
                        .await;
                    self.record_failure(run_id, &pipeline_err).await;
                    return Err(pipeline_err);
                }
            };

            let snapshot = {
                let runner = runner.lock().await;
                runner
                    .get_session(&session_id)
                    .map(|session| session.state.snapshot())
            };
            let progress = snapshot.as_ref().map(|s| s.progress()).unwrap_or(0.0);

            for (node, execution) in &report.executions {
                if let NodeKind::Custom(name) = node {
                    if let Some(slot) = node_name_to_slot(name) {
                        self.record_execution(run_id, slot, report.step, input_snapshot_digest.clone(), execution.clone())
                            .await;
                    }
                    self.publish(
                        run_id,
                        Event::node_message_with_meta(
                            name.clone(),
                            report.step,
                            "engine",
                            format!("completed (progress {progress:.2})"),
                        ),
                    )
                    .await;
                }
            }

            if report.completed {
                self.finish_run(run_id, RunStatus::Completed).await;
                return Ok(RunStatus::Completed);
            }
        }
    }

    /// Signals cancellation and marks the run `Cancelled` immediately so
    /// `get_run` reflects it without waiting for the in-flight superstep to
    /// notice; the background loop (if any) stops at its next check.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<(), PipelineError> {
        let mut runs = self.inner.runs.write().await;
        let record = runs.get_mut(&run_id).ok_or_else(|| unknown_run(run_id))?;
        record.cancellation.cancel();
        record.run.transition(RunStatus::Cancelled);
        Ok(())
    }

    /// Resumes a suspended or cancelled run, re-entering the superstep loop
    /// from its persisted session state. A cancelled run is resumable
    /// because `cancel_run` only stops the superstep loop — the underlying
    /// session's frontier and checkpoint are untouched, so the next step
    /// picks up exactly where the run left off; this is what lets a caller
    /// cancel a run, inspect it, and resume it rather than cancellation
    /// being a dead end.
    pub async fn resume_run(&self, run_id: Uuid) -> Result<(), PipelineError> {
        {
            let mut runs = self.inner.runs.write().await;
            let record = runs.get_mut(&run_id).ok_or_else(|| unknown_run(run_id))?;
            if !matches!(record.run.status, RunStatus::Suspended | RunStatus::Cancelled) {
                return Err(PipelineError::other(
                    PipelineErrorKind::ValidationError,
                    format!("run {run_id} is not suspended or cancelled"),
                ));
            }
            record.cancellation = CancellationToken::new();
            record.run.transition(RunStatus::Running);
        }
        self.start_run(run_id).await
    }

    /// Retries a failed run from its last persisted state, incrementing
    /// `Run.retry_count`.
    pub async fn retry_run(&self, run_id: Uuid) -> Result<(), PipelineError> {
        {
            let mut runs = self.inner.runs.write().await;
            let record = runs.get_mut(&run_id).ok_or_else(|| unknown_run(run_id))?;
            if record.run.status != RunStatus::Failed {
                return Err(PipelineError::other(
                    PipelineErrorKind::ValidationError,
                    format!("run {run_id} has not failed"),
                ));
            }
            record.run.retry_count += 1;
        }
        self.start_run(run_id).await
    }

    /// Returns a snapshot of a run's bookkeeping (status, retry count,
    /// history, error chain).
    pub async fn get_run(&self, run_id: Uuid) -> Option<Run> {
        self.inner
            .runs
            .read()
            .await
            .get(&run_id)
            .map(|record| record.run.clone())
    }

    /// Lists every run the engine knows about, in no particular order.
    pub async fn list_runs(&self) -> Vec<Run> {
        self.inner
            .runs
            .read()
            .await
            .values()
            .map(|record| record.run.clone())
            .collect()
    }

    /// Returns the artifacts accumulated so far by a run's session state.
    pub async fn get_artifacts(&self, run_id: Uuid) -> Result<FxHashMap<String, Artifact>, PipelineError> {
        let graph = {
            let runs = self.inner.runs.read().await;
            runs.get(&run_id).ok_or_else(|| unknown_run(run_id))?.graph
        };
        let runner = self
            .inner
            .runners
            .get(&graph)
            .expect("every GraphSelection variant has a registered runner");
        let runner = runner.lock().await;
        Ok(runner
            .get_session(&run_id.to_string())
            .map(|session| session.state.snapshot().artifacts)
            .unwrap_or_default())
    }

    /// Returns the ordered stage-attempt history recorded for a run
    /// (§3.2's `AgentExecution` audit trail: input snapshot, duration,
    /// token deltas, outcome, and error per attempt).
    pub async fn get_execution_history(&self, run_id: Uuid) -> Result<Vec<AgentExecution>, PipelineError> {
        Ok(self
            .inner
            .runs
            .read()
            .await
            .get(&run_id)
            .ok_or_else(|| unknown_run(run_id))?
            .run
            .history
            .clone())
    }

    /// Returns the run's checkpoint history (newest first), as persisted by
    /// the session's configured `Checkpointer`. `limit` caps how many
    /// checkpoints are returned; `None` returns the full history. Runs backed
    /// by a checkpointer-less session (none configured) return an empty list.
    pub async fn get_history(
        &self,
        run_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Checkpoint>, PipelineError> {
        let graph = {
            let runs = self.inner.runs.read().await;
            runs.get(&run_id).ok_or_else(|| unknown_run(run_id))?.graph
        };
        let runner = self
            .inner
            .runners
            .get(&graph)
            .expect("every GraphSelection variant has a registered runner");
        let runner = runner.lock().await;
        match runner.checkpointer() {
            Some(checkpointer) => checkpointer
                .list(&run_id.to_string(), limit)
                .await
                .map_err(PipelineError::from),
            None => Ok(Vec::new()),
        }
    }

    /// Subscribes to a run's streamed events, returning a subscriber id and
    /// receiver usable with [`SubscriptionHub`].
    pub async fn subscribe(&self, run_id: Uuid) -> (Uuid, flume::Receiver<crate::subscription::SubscriptionEvent>) {
        self.inner.subscriptions.subscribe(run_id).await
    }

    async fn require_run(&self, run_id: Uuid) -> Result<(), PipelineError> {
        if self.inner.runs.read().await.contains_key(&run_id) {
            Ok(())
        } else {
            Err(unknown_run(run_id))
        }
    }

    async fn finish_run(&self, run_id: Uuid, status: RunStatus) {
        if let Some(record) = self.inner.runs.write().await.get_mut(&run_id) {
            record.run.transition(status);
        }
    }

    async fn record_failure(&self, run_id: Uuid, err: &PipelineError) {
        let event = err.to_error_event(crate::channels::errors::ErrorScope::Runner {
            session: run_id.to_string(),
            step: 0,
        });
        if let Some(record) = self.inner.runs.write().await.get_mut(&run_id) {
            record.run.error_chain.push(event);
            record.run.transition(RunStatus::Failed);
        }
        self.publish(run_id, Event::diagnostic("engine", err.to_string()))
            .await;
    }

    /// Appends an `AgentExecution` for a node that finished this superstep
    /// (successfully or after exhausting its retry budget), populated from
    /// the `StageExecutionMeta` its `StageNodeAdapter` attached.
    async fn record_execution(
        &self,
        run_id: Uuid,
        stage: StageSlot,
        step: u64,
        input_snapshot_digest: String,
        execution: Option<StageExecutionMeta>,
    ) {
        let finished_at = chrono::Utc::now();
        let (outcome, duration_ms, token_delta, error, attempt) = match execution {
            Some(meta) => (meta.outcome, meta.duration_ms, meta.token_delta, meta.error, meta.attempts),
            None => (StageOutcome::Ok, 0, TokenUsage::default(), None, step as u32),
        };
        let started_at = finished_at - chrono::Duration::milliseconds(duration_ms as i64);
        if let Some(record) = self.inner.runs.write().await.get_mut(&run_id) {
            record.run.record_execution(AgentExecution {
                stage,
                attempt,
                input_snapshot_digest,
                outcome,
                error,
                duration_ms,
                token_delta,
                started_at,
                finished_at,
            });
        }
    }

    /// Appends an `AgentExecution` with a `Fatal` outcome when a superstep
    /// aborts entirely because one of its nodes errored out. The failing
    /// node's kind is recovered from the `SchedulerError` wrapped inside
    /// `err`; runner-level failures with no single attributable node are
    /// left to `record_failure`'s run-level error chain alone.
    async fn record_fatal_execution(&self, run_id: Uuid, err: &PipelineError, input_snapshot_digest: String, duration_ms: u64) {
        let Some((stage, message)) = fatal_stage_and_message(err) else {
            return;
        };
        let now = chrono::Utc::now();
        let error = ErrorEvent {
            when: now,
            scope: ErrorScope::Runner {
                session: run_id.to_string(),
                step: 0,
            },
            error: LadderError::msg(message),
            tags: vec!["fatal".into()],
            context: serde_json::Value::Null,
        };
        if let Some(record) = self.inner.runs.write().await.get_mut(&run_id) {
            record.run.record_execution(AgentExecution {
                stage,
                attempt: 0,
                input_snapshot_digest,
                outcome: StageOutcome::Fatal,
                error: Some(error),
                duration_ms,
                token_delta: TokenUsage::default(),
                started_at: now - chrono::Duration::milliseconds(duration_ms as i64),
                finished_at: now,
            });
        }
    }

    async fn publish(&self, run_id: Uuid, event: Event) {
        let _ = self.inner.subscriptions.publish(run_id, event).await;
    }
}

fn unknown_run(run_id: Uuid) -> PipelineError {
    PipelineError::other(PipelineErrorKind::ValidationError, format!("unknown run {run_id}"))
}

/// Recovers the failing stage and an error message from a `PipelineError`
/// wrapping a `SchedulerError::NodeRun`, the only variant that names the
/// node that caused the abort. Returns `None` for errors with no single
/// attributable node (join panics, checkpoint/runner-level failures).
fn fatal_stage_and_message(err: &PipelineError) -> Option<(StageSlot, String)> {
    let scheduler_err = match err {
        PipelineError::Scheduler(s) => s,
        PipelineError::Runner(crate::runtimes::runner::RunnerError::Scheduler(s)) => s,
        _ => return None,
    };
    let SchedulerError::NodeRun { kind, source, .. } = scheduler_err else {
        return None;
    };
    let NodeKind::Custom(name) = kind else {
        return None;
    };
    node_name_to_slot(name).map(|stage| (stage, source.to_string()))
}

/// Hash of a state snapshot's debug representation, for the audit trail's
/// `input_snapshot_digest` — cheap replay comparison without persisting the
/// full snapshot per attempt.
fn snapshot_digest(snapshot: &StateSnapshot) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{snapshot:?}").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_run_selects_main_graph_for_feature_tasks() {
        let engine = PipelineEngine::new().await.unwrap();
        let run_id = engine.create_run(TaskKind::Feature, "build a thing").await.unwrap();
        let run = engine.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.task_kind, TaskKind::Feature);
    }

    #[tokio::test]
    async fn hotfix_run_completes_via_hotfix_graph() {
        let engine = PipelineEngine::new().await.unwrap();
        let run_id = engine.create_run(TaskKind::Hotfix, "patch a bug").await.unwrap();
        let status = engine.execute_run(run_id).await.unwrap();
        assert_eq!(status, RunStatus::Completed);

        let run = engine.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(!run.history.is_empty());
    }

    #[tokio::test]
    async fn feature_run_completes_via_main_graph() {
        let engine = PipelineEngine::new().await.unwrap();
        let run_id = engine.create_run(TaskKind::Feature, "add a feature").await.unwrap();
        let status = engine.execute_run(run_id).await.unwrap();
        assert_eq!(status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn execution_history_carries_real_per_attempt_data() {
        let engine = PipelineEngine::new().await.unwrap();
        let run_id = engine.create_run(TaskKind::Hotfix, "patch a bug").await.unwrap();
        engine.execute_run(run_id).await.unwrap();

        let history = engine.get_execution_history(run_id).await.unwrap();
        assert!(!history.is_empty());
        for execution in &history {
            assert_eq!(execution.outcome, crate::run::StageOutcome::Ok);
            assert!(!execution.input_snapshot_digest.is_empty());
            assert!(execution.finished_at >= execution.started_at);
        }
    }

    #[tokio::test]
    async fn cancel_before_execution_marks_run_cancelled() {
        let engine = PipelineEngine::new().await.unwrap();
        let run_id = engine.create_run(TaskKind::Feature, "never runs").await.unwrap();
        engine.cancel_run(run_id).await.unwrap();
        let status = engine.execute_run(run_id).await.unwrap();
        assert_eq!(status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn get_run_on_unknown_id_is_none() {
        let engine = PipelineEngine::new().await.unwrap();
        assert!(engine.get_run(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn get_execution_history_returns_error_for_unknown_run() {
        let engine = PipelineEngine::new().await.unwrap();
        assert!(engine.get_execution_history(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn get_history_returns_error_for_unknown_run() {
        let engine = PipelineEngine::new().await.unwrap();
        assert!(engine.get_history(Uuid::new_v4(), None).await.is_err());
    }

    #[tokio::test]
    async fn get_history_returns_checkpoints_after_run_completes() {
        let engine = PipelineEngine::new().await.unwrap();
        let run_id = engine.create_run(TaskKind::Hotfix, "patch a bug").await.unwrap();
        engine.execute_run(run_id).await.unwrap();
        let checkpoints = engine.get_history(run_id, None).await.unwrap();
        assert!(!checkpoints.is_empty());
        for pair in checkpoints.windows(2) {
            assert!(pair[0].step >= pair[1].step, "checkpoints must be newest first");
        }
    }

    #[tokio::test]
    async fn retry_run_requires_failed_status() {
        let engine = PipelineEngine::new().await.unwrap();
        let run_id = engine.create_run(TaskKind::Feature, "not failed yet").await.unwrap();
        let result = engine.retry_run(run_id).await;
        assert!(result.is_err());
    }
}
