//! The [`Scheduler`] decides which nodes in a frontier are stale enough to
//! re-run (version-gated, à la Pregel's "vote to halt") and drives the
//! bounded-concurrency fan-out for the ones that are.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::event_bus::EventEmitter;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Per-session bookkeeping the scheduler needs across supersteps: the last
/// channel versions each node observed, keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
}

/// Result of running one superstep over a frontier.
#[derive(Debug, Clone, Default)]
pub struct StepRunResult {
    /// Nodes that actually ran this step, in scheduling order.
    pub ran_nodes: Vec<NodeKind>,
    /// Nodes skipped this step, either virtual (Start/End) or version-gated.
    pub skipped_nodes: Vec<NodeKind>,
    /// Partial state produced by each node that ran. Order matches completion
    /// order, not necessarily `ran_nodes` order, except when concurrency is 1.
    pub outputs: Vec<(NodeKind, NodePartial)>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("node {kind:?} failed at step {step}: {source}")]
    #[diagnostic(code(pipeline_engine::scheduler::node_run))]
    NodeRun {
        kind: NodeKind,
        step: u64,
        #[source]
        source: NodeError,
    },

    #[error("node task panicked or was cancelled: {0}")]
    #[diagnostic(code(pipeline_engine::scheduler::join))]
    Join(#[from] tokio::task::JoinError),
}

/// Bounded-concurrency executor for one superstep.
///
/// `Scheduler` itself is stateless config (just the concurrency cap); the
/// mutable gating state lives in [`SchedulerState`] so it can be
/// checkpointed and restored independently of the scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pub concurrency_limit: usize,
}

impl Scheduler {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// True if `id` has never been seen, or any channel it last observed has
    /// since advanced. This is the "did my inputs change" gate that keeps a
    /// converged graph from re-running nodes forever.
    pub fn should_run(&self, state: &SchedulerState, id: &str, snapshot: &StateSnapshot) -> bool {
        match state.versions_seen.get(id) {
            None => true,
            Some(seen) => channel_versions(snapshot)
                .into_iter()
                .any(|(channel, version)| seen.get(channel).is_none_or(|&last| version > last)),
        }
    }

    /// Record the channel versions `id` has now observed.
    pub fn record_seen(&self, state: &mut SchedulerState, id: &str, snapshot: &StateSnapshot) {
        let entry = state.versions_seen.entry(id.to_string()).or_default();
        for (channel, version) in channel_versions(snapshot) {
            entry.insert(channel.to_string(), version);
        }
    }

    /// Run one superstep over `frontier`.
    ///
    /// `Start`/`End` are virtual nodes and are always skipped. Remaining
    /// nodes are gated by [`Self::should_run`]; eligible nodes run
    /// concurrently, bounded by `concurrency_limit`, and each success is
    /// immediately recorded via [`Self::record_seen`]. The first node error
    /// encountered aborts the superstep.
    pub async fn superstep(
        &self,
        state: &mut SchedulerState,
        nodes: &FxHashMap<NodeKind, Arc<dyn Node>>,
        frontier: Vec<NodeKind>,
        snapshot: StateSnapshot,
        step: u64,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<StepRunResult, SchedulerError> {
        let mut skipped_nodes = Vec::new();
        let mut to_run = Vec::new();

        for kind in frontier {
            if matches!(kind, NodeKind::Start | NodeKind::End) {
                skipped_nodes.push(kind);
                continue;
            }
            let id = kind.encode();
            if self.should_run(state, &id, &snapshot) {
                to_run.push(kind);
            } else {
                skipped_nodes.push(kind);
            }
        }

        let mut ran_nodes = Vec::with_capacity(to_run.len());
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut joins: JoinSet<(NodeKind, Result<NodePartial, NodeError>)> = JoinSet::new();

        for kind in &to_run {
            let Some(node) = nodes.get(kind) else {
                // Frontier references a node the app doesn't know about; treat it
                // as skipped rather than panicking. The graph compiler is the
                // real guard against this, so this only matters for ad hoc callers.
                skipped_nodes.push(kind.clone());
                continue;
            };
            ran_nodes.push(kind.clone());

            let node = Arc::clone(node);
            let kind = kind.clone();
            let snapshot = snapshot.clone();
            let emitter = Arc::clone(&emitter);
            let semaphore = Arc::clone(&semaphore);
            let node_id = kind.encode();

            joins.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore is never closed while supersteps are in flight");
                let ctx = NodeContext {
                    node_id,
                    step,
                    event_emitter: emitter,
                };
                let result = node.run(snapshot, ctx).await;
                (kind, result)
            });
        }

        let mut outputs = Vec::with_capacity(ran_nodes.len());
        while let Some(joined) = joins.join_next().await {
            let (kind, result) = joined?;
            match result {
                Ok(partial) => {
                    let id = kind.encode();
                    self.record_seen(state, &id, &snapshot);
                    outputs.push((kind, partial));
                }
                Err(source) => {
                    return Err(SchedulerError::NodeRun { kind, step, source });
                }
            }
        }

        Ok(StepRunResult {
            ran_nodes,
            skipped_nodes,
            outputs,
        })
    }
}

/// The channel versions a snapshot carries, named the way they're persisted
/// in [`SchedulerState::versions_seen`].
fn channel_versions(snapshot: &StateSnapshot) -> [(&'static str, u64); 6] {
    [
        ("messages", u64::from(snapshot.messages_version)),
        ("extra", u64::from(snapshot.extra_version)),
        ("errors", u64::from(snapshot.errors_version)),
        ("stage_outputs", u64::from(snapshot.stage_outputs_version)),
        ("artifacts", u64::from(snapshot.artifacts_version)),
        ("token_usage", u64::from(snapshot.token_usage_version)),
    ]
}
