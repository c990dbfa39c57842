//! The `Run` entity: a single pipeline execution's identity, status
//! lifecycle, and per-attempt execution history.
//!
//! Distinct from [`crate::state::RunState`], which holds the data a run
//! carries; `Run` holds the bookkeeping around *how* that data came to be
//! (status, retries, the ordered history of stage attempts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::ErrorEvent;
use crate::types::StageSlot;

/// The kind of task a run was created for. Closed set so routing predicates
/// can match exhaustively rather than falling back to string comparisons.
///
/// `Hotfix` tasks skip planning and review (`graphs::pipeline::build_hotfix_graph`);
/// all other kinds run the full `analyze → plan → develop → test → review →
/// deploy → monitor` graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Feature,
    Bugfix,
    Hotfix,
    Refactor,
    Documentation,
}

impl TaskKind {
    /// Hotfix tasks bypass planning and review to minimize time-to-deploy.
    #[must_use]
    pub fn skips_planning_and_review(&self) -> bool {
        matches!(self, TaskKind::Hotfix)
    }
}

/// Outcome of the review stage, collapsing the two redundant boolean/string
/// fields of the distilled model into one closed set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    ApprovedWithComments,
    NeedsChanges,
    Rejected,
}

impl ReviewOutcome {
    /// `Approved`/`ApprovedWithComments` continue to `deploy`; the rest route
    /// back to `develop` (bounded by `retry_count`) or terminate the run.
    #[must_use]
    pub fn routes_to_deploy(&self) -> bool {
        matches!(self, ReviewOutcome::Approved | ReviewOutcome::ApprovedWithComments)
    }
}

/// Lifecycle status of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// A terminal status never transitions further; `get_run` callers can
    /// stop polling once this returns true.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// The outcome of a single stage attempt, as recorded in `Run.history`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Ok,
    NeedsRetry,
    Suspend,
    Fatal,
}

/// One record per stage attempt, appended to `Run.history`. Never merged
/// into `RunState`'s accumulators directly; it is the source `get_history`
/// reads from, separate from the run's data channels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentExecution {
    pub stage: StageSlot,
    pub attempt: u32,
    /// Hash of the state snapshot the stage ran against, for audit/replay
    /// comparison without storing the full snapshot per attempt.
    pub input_snapshot_digest: String,
    pub outcome: StageOutcome,
    pub error: Option<ErrorEvent>,
    pub duration_ms: u64,
    pub token_delta: crate::channels::token_usage::TokenUsage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A single pipeline execution.
///
/// `Run` is the unit of identity the Workflow Engine façade
/// (`create_run`/`get_run`/`cancel_run`/...) operates on; its `id` doubles as
/// the checkpoint store's `thread_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub status: RunStatus,
    pub task_kind: TaskKind,
    pub retry_count: u32,
    /// Ordered by occurrence; the first entry is the run's primary error
    /// per the error-handling design's "first element names the failing
    /// stage and the error kind" contract.
    pub error_chain: Vec<ErrorEvent>,
    pub history: Vec<AgentExecution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    #[must_use]
    pub fn new(task_kind: TaskKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Pending,
            task_kind,
            retry_count: 0,
            error_chain: Vec::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_execution(&mut self, execution: AgentExecution) {
        if let Some(error) = execution.error.clone() {
            self.error_chain.push(error);
        }
        self.history.push(execution);
        self.updated_at = Utc::now();
    }

    pub fn transition(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotfix_skips_planning_and_review() {
        assert!(TaskKind::Hotfix.skips_planning_and_review());
        assert!(!TaskKind::Feature.skips_planning_and_review());
    }

    #[test]
    fn review_outcome_routing() {
        assert!(ReviewOutcome::Approved.routes_to_deploy());
        assert!(ReviewOutcome::ApprovedWithComments.routes_to_deploy());
        assert!(!ReviewOutcome::NeedsChanges.routes_to_deploy());
        assert!(!ReviewOutcome::Rejected.routes_to_deploy());
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Suspended.is_terminal());
    }

    #[test]
    fn new_run_starts_pending_with_empty_history() {
        let run = Run::new(TaskKind::Feature);
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.retry_count, 0);
        assert!(run.history.is_empty());
        assert!(run.error_chain.is_empty());
    }
}
