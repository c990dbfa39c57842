//! Stage Runtime: the contract pipeline stages implement, and the retry
//! loop that turns a [`Stage`] into a [`Node`] the scheduler can run.
//!
//! Grounded on the teacher's [`Node`] trait as the low-level execution
//! primitive, with the validate/execute/timing contract of a `BaseNode`
//! (a `node_error_handler`-style decorator timing each attempt and counting
//! retries) expressed as composition rather than inheritance: a `Stage`
//! describes what to do, [`StageNodeAdapter`] describes how many times and
//! how to wait between attempts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use rand::Rng;
use thiserror::Error;

use crate::node::{Node, NodeContext, NodeError, NodePartial, StageExecutionMeta};
use crate::run::StageOutcome;
use crate::state::StateSnapshot;
use crate::types::StageSlot;

/// Base delay for the first retry.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Backoff never waits longer than this between attempts, even with jitter.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("stage {stage} input validation failed: {message}")]
    #[diagnostic(code(pipeline_engine::stage::validation))]
    Validation { stage: String, message: String },

    #[error("stage {stage} timed out after {elapsed_ms}ms")]
    #[diagnostic(code(pipeline_engine::stage::timeout))]
    Timeout { stage: String, elapsed_ms: u64 },

    #[error("stage {stage} failed: {message}")]
    #[diagnostic(code(pipeline_engine::stage::failed))]
    Failed {
        stage: String,
        message: String,
        retryable: bool,
    },
}

impl StageError {
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            StageError::Validation { .. } => false,
            StageError::Timeout { .. } => true,
            StageError::Failed { retryable, .. } => *retryable,
        }
    }
}

/// The outcome of one stage attempt, paired with the state delta it produced.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub outcome: StageOutcome,
    pub partial: NodePartial,
}

impl StageResult {
    #[must_use]
    pub fn ok(partial: NodePartial) -> Self {
        Self {
            outcome: StageOutcome::Ok,
            partial,
        }
    }
}

/// A unit of pipeline work: validates its input against the current
/// snapshot, then executes, producing a [`StageResult`] that classifies
/// whether the attempt succeeded, needs a retry, should suspend the run, or
/// failed fatally.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable, human-readable name used in error messages and tracing spans.
    fn name(&self) -> &str;

    /// Which of the seven stage-output slots this stage writes.
    fn slot(&self) -> StageSlot;

    /// Cheap, synchronous precondition check run before every attempt.
    fn validate_input(&self, snapshot: &StateSnapshot) -> Result<(), StageError>;

    /// Do the work.
    async fn execute(
        &self,
        snapshot: &StateSnapshot,
        ctx: &NodeContext,
    ) -> Result<StageResult, StageError>;
}

/// How many times and how long [`StageNodeAdapter`] retries a stage.
#[derive(Clone, Copy, Debug)]
pub struct StageSpec {
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for StageSpec {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(300),
        }
    }
}

impl StageSpec {
    #[must_use]
    pub fn new(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout,
        }
    }
}

/// Bridges a [`Stage`] into the [`Node`] trait the scheduler runs, owning
/// the validate/execute/timeout/retry loop so individual stages only
/// implement their own logic.
pub struct StageNodeAdapter {
    stage: Arc<dyn Stage>,
    spec: StageSpec,
}

impl StageNodeAdapter {
    #[must_use]
    pub fn new(stage: Arc<dyn Stage>, spec: StageSpec) -> Self {
        Self { stage, spec }
    }

    /// Full-jitter exponential backoff: a uniform random delay between zero
    /// and `min(cap, base * 2^attempt)`, so concurrent retrying stages don't
    /// all wake up in lockstep.
    fn backoff_delay(attempt: u32) -> Duration {
        let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exp.min(BACKOFF_CAP);
        let millis = capped.as_millis().min(u128::from(u32::MAX)) as u32;
        let jittered = rand::rng().random_range(0..=millis);
        Duration::from_millis(u64::from(jittered))
    }
}

#[async_trait]
impl Node for StageNodeAdapter {
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodePartial, NodeError> {
        self.stage
            .validate_input(&snapshot)
            .map_err(|err| NodeError::ValidationFailed(err.to_string()))?;

        let started = std::time::Instant::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(self.spec.timeout, self.stage.execute(&snapshot, &ctx))
                .await
                .unwrap_or_else(|_| {
                    Err(StageError::Timeout {
                        stage: self.stage.name().to_string(),
                        elapsed_ms: self.spec.timeout.as_millis() as u64,
                    })
                });

            match outcome {
                Ok(StageResult {
                    outcome: outcome @ (StageOutcome::Ok | StageOutcome::Suspend),
                    partial,
                }) => {
                    return Ok(self.with_meta(partial, attempt, outcome, started));
                }
                Ok(StageResult {
                    outcome: StageOutcome::NeedsRetry,
                    partial,
                }) => {
                    if attempt >= self.spec.max_attempts {
                        return Ok(self.with_meta(partial, attempt, StageOutcome::NeedsRetry, started));
                    }
                    tokio::time::sleep(Self::backoff_delay(attempt)).await;
                }
                Ok(StageResult {
                    outcome: StageOutcome::Fatal,
                    ..
                }) => {
                    return Err(NodeError::Provider {
                        provider: "stage_runtime",
                        message: format!("stage {} reported a fatal outcome", self.stage.name()),
                    });
                }
                Err(err) if err.retryable() && attempt < self.spec.max_attempts => {
                    tokio::time::sleep(Self::backoff_delay(attempt)).await;
                }
                Err(err) => {
                    return Err(NodeError::Provider {
                        provider: "stage_runtime",
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

impl StageNodeAdapter {
    /// Attaches this attempt's [`StageExecutionMeta`] to `partial`, timing
    /// the whole retry loop from its first attempt rather than just the
    /// final try.
    fn with_meta(&self, partial: NodePartial, attempts: u32, outcome: StageOutcome, started: std::time::Instant) -> NodePartial {
        let token_delta = partial.tokens.clone().unwrap_or_default();
        partial.with_execution_meta(StageExecutionMeta {
            attempts,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            token_delta,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, EventEmitter};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyStage {
        slot: StageSlot,
        fail_times: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Stage for FlakyStage {
        fn name(&self) -> &str {
            "flaky"
        }

        fn slot(&self) -> StageSlot {
            self.slot
        }

        fn validate_input(&self, _snapshot: &StateSnapshot) -> Result<(), StageError> {
            Ok(())
        }

        async fn execute(
            &self,
            _snapshot: &StateSnapshot,
            _ctx: &NodeContext,
        ) -> Result<StageResult, StageError> {
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            if attempt <= self.fail_times {
                Ok(StageResult {
                    outcome: StageOutcome::NeedsRetry,
                    partial: NodePartial::default(),
                })
            } else {
                Ok(StageResult::ok(
                    NodePartial::new().with_stage_output(self.slot, serde_json::json!({"ok": true})),
                ))
            }
        }
    }

    fn test_ctx() -> (NodeContext, Arc<EventBus>) {
        let bus = Arc::new(EventBus::with_sink(crate::event_bus::MemorySink::default()));
        let emitter: Arc<dyn EventEmitter> = bus.get_emitter();
        (
            NodeContext {
                node_id: "test".into(),
                step: 0,
                event_emitter: emitter,
            },
            bus,
        )
    }

    #[tokio::test]
    async fn retries_until_success_within_attempt_budget() {
        let stage = Arc::new(FlakyStage {
            slot: StageSlot::Analysis,
            fail_times: 2,
            attempts: AtomicU32::new(0),
        });
        let adapter = StageNodeAdapter::new(stage.clone(), StageSpec::new(5, Duration::from_secs(1)));
        let (ctx, _bus) = test_ctx();
        let snapshot = crate::state::RunState::new_feature_run("test").snapshot();

        let result = adapter.run(snapshot, ctx).await.unwrap();
        assert!(result.stage_output.is_some());
        assert_eq!(stage.attempts.load(Ordering::Relaxed), 3);
        let meta = result.execution.expect("adapter always attaches execution metadata on Ok");
        assert_eq!(meta.attempts, 3);
        assert_eq!(meta.outcome, StageOutcome::Ok);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_without_erroring() {
        let stage = Arc::new(FlakyStage {
            slot: StageSlot::Analysis,
            fail_times: 10,
            attempts: AtomicU32::new(0),
        });
        let adapter = StageNodeAdapter::new(stage.clone(), StageSpec::new(2, Duration::from_secs(1)));
        let (ctx, _bus) = test_ctx();
        let snapshot = crate::state::RunState::new_feature_run("test").snapshot();

        let result = adapter.run(snapshot, ctx).await.unwrap();
        assert!(result.stage_output.is_none());
        assert_eq!(stage.attempts.load(Ordering::Relaxed), 2);
        let meta = result.execution.expect("adapter attaches execution metadata even when retries are exhausted");
        assert_eq!(meta.attempts, 2);
        assert_eq!(meta.outcome, StageOutcome::NeedsRetry);
    }

    #[test]
    fn backoff_delay_never_exceeds_cap() {
        for attempt in 0..10 {
            assert!(StageNodeAdapter::backoff_delay(attempt) <= BACKOFF_CAP);
        }
    }
}
