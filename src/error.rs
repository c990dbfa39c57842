//! Crate-wide error taxonomy.
//!
//! Component modules each own a narrow `thiserror`+`miette::Diagnostic` enum
//! (`NodeError`, `SchedulerError`, `RunnerError`, `CheckpointerError`,
//! `GraphCompileError`, `ReducerError`, ...); this module adds the
//! cross-cutting classification (`PipelineErrorKind`, with its `retryable()`
//! predicate) and a top-level `PipelineError` that aggregates every
//! component error via `#[from]` so callers of the Workflow Engine façade
//! have one error type to match on.

use miette::Diagnostic;
use thiserror::Error;

use crate::channels::errors::ErrorEvent;
use crate::graphs::GraphCompileError;
use crate::node::NodeError;
use crate::reducers::ReducerError;
use crate::runtimes::checkpointer::CheckpointerError;
use crate::runtimes::runner::RunnerError;
use crate::schedulers::SchedulerError;
use crate::state::ImmutableInputError;

/// Cross-cutting classification of a failure, independent of which
/// component raised it. Used to decide whether a stage/model-call/run
/// should be retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineErrorKind {
    /// A write attempted to mutate one of `RunState`'s immutable inputs.
    ContractBreach,
    /// Caller-supplied input failed validation.
    ValidationError,
    /// A model call exceeded its token budget.
    TokenLimitExceeded,
    /// A model call was rate-limited by the provider.
    RateLimited,
    /// A transport-level timeout (model call or stage).
    TransportTimeout,
    /// The transport/provider is unreachable.
    TransportUnavailable,
    /// The checkpoint store could not be reached or is misconfigured.
    CheckpointUnavailable,
    /// A registered capability is unavailable (health check failed).
    CapabilityUnavailable,
    /// A stage produced output that failed its output contract.
    ContentError,
    /// The run was cancelled via its `CancellationToken`.
    Cancelled,
    /// An error with no more specific classification.
    InternalError,
}

impl PipelineErrorKind {
    /// Whether a failure of this kind is worth retrying.
    ///
    /// `RateLimited` and the two transport kinds are transient by nature;
    /// `TokenLimitExceeded` is retryable only in the sense that a smaller
    /// prompt might succeed, which is a caller decision, so it is excluded
    /// here. Everything else is a permanent failure for the current attempt.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            PipelineErrorKind::RateLimited
                | PipelineErrorKind::TransportTimeout
                | PipelineErrorKind::TransportUnavailable
        )
    }
}

/// Top-level error aggregate for the Workflow Engine façade.
///
/// Each variant wraps a component's own error type verbatim so existing
/// `?`-propagation from `runtimes`/`schedulers`/`reducers`/`node` call sites
/// keeps working; `kind()` maps any variant to its `PipelineErrorKind`.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(code(pipeline_engine::error::runner))]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    #[diagnostic(code(pipeline_engine::error::scheduler))]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(code(pipeline_engine::error::checkpointer))]
    Checkpointer(#[from] CheckpointerError),

    #[error(transparent)]
    #[diagnostic(code(pipeline_engine::error::node))]
    Node(#[from] NodeError),

    #[error(transparent)]
    #[diagnostic(code(pipeline_engine::error::graph_compile))]
    GraphCompile(#[from] GraphCompileError),

    #[error(transparent)]
    #[diagnostic(code(pipeline_engine::error::reducer))]
    Reducer(#[from] ReducerError),

    #[error(transparent)]
    #[diagnostic(code(pipeline_engine::error::contract_breach))]
    ContractBreach(#[from] ImmutableInputError),

    #[error("run was cancelled")]
    #[diagnostic(code(pipeline_engine::error::cancelled))]
    Cancelled,

    #[error("{kind:?}: {message}")]
    #[diagnostic(code(pipeline_engine::error::other))]
    Other {
        kind: PipelineErrorKind,
        message: String,
    },
}

impl PipelineError {
    /// Classify this error into its [`PipelineErrorKind`].
    #[must_use]
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::Runner(_) => PipelineErrorKind::InternalError,
            PipelineError::Scheduler(_) => PipelineErrorKind::InternalError,
            PipelineError::Checkpointer(_) => PipelineErrorKind::CheckpointUnavailable,
            PipelineError::Node(_) => PipelineErrorKind::ContentError,
            PipelineError::GraphCompile(_) => PipelineErrorKind::ValidationError,
            PipelineError::Reducer(_) => PipelineErrorKind::InternalError,
            PipelineError::ContractBreach(_) => PipelineErrorKind::ContractBreach,
            PipelineError::Cancelled => PipelineErrorKind::Cancelled,
            PipelineError::Other { kind, .. } => *kind,
        }
    }

    /// Whether this error is worth retrying, per [`PipelineErrorKind::retryable`].
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().retryable()
    }

    /// Construct an `ErrorEvent` suitable for `Run.error_chain`/`RunState.errors`
    /// from an arbitrary classified message, for components that don't have
    /// their own `ErrorEvent`-producing error type (e.g. the Model-Call
    /// Adapter, Capability Registry).
    #[must_use]
    pub fn other(kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        PipelineError::Other {
            kind,
            message: message.into(),
        }
    }

    /// Best-effort conversion into an `ErrorEvent` for `Run.error_chain`.
    #[must_use]
    pub fn to_error_event(&self, scope: crate::channels::errors::ErrorScope) -> ErrorEvent {
        ErrorEvent {
            when: chrono::Utc::now(),
            scope,
            error: crate::channels::errors::LadderError::msg(self.to_string()),
            tags: vec![format!("{:?}", self.kind())],
            context: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_and_transport_kinds_are_retryable() {
        assert!(PipelineErrorKind::RateLimited.retryable());
        assert!(PipelineErrorKind::TransportTimeout.retryable());
        assert!(PipelineErrorKind::TransportUnavailable.retryable());
    }

    #[test]
    fn contract_and_validation_kinds_are_not_retryable() {
        assert!(!PipelineErrorKind::ContractBreach.retryable());
        assert!(!PipelineErrorKind::ValidationError.retryable());
        assert!(!PipelineErrorKind::Cancelled.retryable());
    }

    #[test]
    fn other_error_round_trips_kind() {
        let err = PipelineError::other(PipelineErrorKind::RateLimited, "provider backoff");
        assert_eq!(err.kind(), PipelineErrorKind::RateLimited);
        assert!(err.is_retryable());
    }
}
