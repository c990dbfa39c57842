use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::channels::Channel;
use crate::node::*;
use crate::reducers::{ReducerError, ReducerRegistry};
use crate::runtimes::runner::RunnerError;
use crate::runtimes::{CheckpointerType, RuntimeConfig, SessionInit};
use crate::state::*;
use crate::types::*;
use tracing::{debug, instrument};

/// Result of applying a superstep's barrier: merged node partials into
/// `RunState`, reporting which channels actually changed version.
#[derive(Debug, Clone, Default)]
pub struct BarrierOutcome {
    pub updated_channels: Vec<&'static str>,
}

/// Snapshot of every channel's version counter, for before/after diffing
/// around a barrier merge.
struct ChannelVersions {
    messages: u32,
    extra: u32,
    errors: u32,
    stage_outputs: u32,
    artifacts: u32,
    token_usage: u32,
}

impl ChannelVersions {
    fn capture(state: &RunState) -> Self {
        Self {
            messages: state.messages.version(),
            extra: state.extra.version(),
            errors: state.errors.version(),
            stage_outputs: state.stage_outputs.version(),
            artifacts: state.artifacts.version(),
            token_usage: state.token_usage.version(),
        }
    }

    fn diff(&self, after: &Self) -> Vec<&'static str> {
        let mut updated = Vec::new();
        if after.messages != self.messages {
            updated.push("messages");
        }
        if after.extra != self.extra {
            updated.push("extra");
        }
        if after.errors != self.errors {
            updated.push("errors");
        }
        if after.stage_outputs != self.stage_outputs {
            updated.push("stage_outputs");
        }
        if after.artifacts != self.artifacts {
            updated.push("artifacts");
        }
        if after.token_usage != self.token_usage {
            updated.push("token_usage");
        }
        updated
    }
}

/// Orchestrates graph execution and applies reducers at barriers.
///
/// `App` is the central coordination point for workflow execution, managing:
/// - Node graph topology (nodes, edges, conditional routing)
/// - State reduction through configurable reducers
/// - Runtime configuration and checkpointing
///
/// # Examples
///
/// ```rust,no_run
/// use pipeline_engine::graphs::GraphBuilder;
/// use pipeline_engine::runtimes::CheckpointerType;
/// use pipeline_engine::state::RunState;
/// use pipeline_engine::types::NodeKind;
/// use pipeline_engine::node::{Node, NodeContext, NodeError, NodePartial};
/// use async_trait::async_trait;
///
/// # struct MyNode;
/// # #[async_trait]
/// # impl Node for MyNode {
/// #     async fn run(&self, _: pipeline_engine::state::StateSnapshot, _: NodeContext) -> Result<NodePartial, NodeError> {
/// #         Ok(NodePartial::default())
/// #     }
/// # }
/// #
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::Custom("process".into()), MyNode)
///     .add_edge(NodeKind::Start, NodeKind::Custom("process".into()))
///     .add_edge(NodeKind::Custom("process".into()), NodeKind::End)
///     .compile()?;
///
/// let initial_state = RunState::new_with_user_message("Hello");
/// let final_state = app.invoke(initial_state).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    conditional_edges: Vec<crate::graphs::ConditionalEdge>,
    reducer_registry: ReducerRegistry,
    runtime_config: RuntimeConfig,
}

impl App {
    /// Internal (crate) factory to build an App while keeping nodes/edges private.
    pub(crate) fn from_parts(
        nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
        edges: FxHashMap<NodeKind, Vec<NodeKind>>,
        conditional_edges: Vec<crate::graphs::ConditionalEdge>,
        runtime_config: RuntimeConfig,
        reducer_registry: ReducerRegistry,
    ) -> Self {
        App {
            nodes,
            edges,
            conditional_edges,
            reducer_registry,
            runtime_config,
        }
    }

    /// Returns a reference to the conditional edges in this graph.
    ///
    /// Conditional edges enable dynamic routing based on runtime state,
    /// allowing workflows to branch based on computed conditions. Predicates
    /// return a String which is interpreted as the next target node:
    /// - "End" and "Start" are recognized as virtual endpoints
    /// - any other string is treated as the name of a custom node
    ///
    /// At runtime, targets are validated before being pushed to the frontier.
    /// Unknown custom targets are skipped with a warning, preserving progress.
    ///
    /// # Returns
    /// A slice of conditional edge specifications.
    #[must_use]
    pub fn conditional_edges(&self) -> &Vec<crate::graphs::ConditionalEdge> {
        &self.conditional_edges
    }

    /// Returns a reference to the nodes registry.
    ///
    /// Provides access to all registered node implementations in the graph.
    /// Nodes are keyed by their `NodeKind` identifier.
    ///
    /// # Returns
    /// A map from `NodeKind` to the corresponding `Node` implementation.
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeKind, Arc<dyn Node>> {
        &self.nodes
    }

    /// Returns a reference to the unconditional edges in this graph.
    ///
    /// Unconditional edges define the static topology of the workflow graph,
    /// specifying which nodes can transition to which other nodes.
    ///
    /// # Returns
    /// A map from source `NodeKind` to a list of destination `NodeKind`s.
    #[must_use]
    pub fn edges(&self) -> &FxHashMap<NodeKind, Vec<NodeKind>> {
        &self.edges
    }

    /// Returns a reference to the runtime configuration.
    ///
    /// Runtime configuration includes checkpointer settings, session IDs,
    /// and other execution parameters.
    ///
    /// # Returns
    /// The current runtime configuration.
    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    /// Execute the entire workflow until completion or no nodes remain.
    ///
    /// This is the primary entry point for workflow execution. It creates an
    /// `AppRunner`, manages session state, and coordinates execution through
    /// to completion.
    ///
    /// # Parameters
    /// * `initial_state` - The starting state for workflow execution
    ///
    /// # Returns
    /// * `Ok(RunState)` - The final state after workflow completion
    /// * `Err(RunnerError)` - If execution fails due to node errors,
    ///   checkpointer issues, or other runtime problems
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use pipeline_engine::state::RunState;
    /// use pipeline_engine::channels::Channel;
    /// # use pipeline_engine::app::App;
    /// # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
    /// let initial = RunState::new_with_user_message("Start workflow");
    /// let final_state = app.invoke(initial).await?;
    /// println!("Workflow completed with {} messages", final_state.messages.len());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Workflow Lifecycle
    /// 1. Creates an `AppRunner` with the configured checkpointer
    /// 2. Initializes or resumes a session
    /// 3. Executes supersteps until End nodes or empty frontier
    /// 4. Returns the final accumulated state
    #[instrument(skip(self, initial_state), err)]
    pub async fn invoke(
        &self,
        initial_state: RunState,
    ) -> Result<RunState, RunnerError> {
        use crate::runtimes::AppRunner;

        // Determine checkpointer type (default to InMemory if none supplied)
        let checkpointer_type = self
            .runtime_config
            .checkpointer
            .clone()
            .unwrap_or(CheckpointerType::InMemory);

        // Create async runner
        let mut runner = AppRunner::new(self.clone(), checkpointer_type).await;

        let session_id = self
            .runtime_config
            .session_id
            .clone()
            .unwrap_or_else(|| "temp_invoke_session".to_string());

        let init_state = runner
            .create_session(session_id.clone(), initial_state)
            .await?;

        if let SessionInit::Resumed { checkpoint_step } = init_state {
            debug!(session_id = %session_id, checkpoint_step, "resuming session from checkpoint");
        }
        runner.run_until_complete(&session_id).await
    }

    /// Merge node outputs and apply state reductions after a superstep.
    ///
    /// This method coordinates the barrier synchronization phase of workflow
    /// execution, where all node outputs from a superstep are collected,
    /// merged, and applied to the global state via registered reducers.
    ///
    /// # Parameters
    /// * `state` - Mutable reference to the current versioned state
    /// * `run_ids` - Slice of node kinds that executed in this superstep
    /// * `node_partials` - Vector of partial updates from each executed node
    ///
    /// # Returns
    /// * `Ok(BarrierOutcome)` - Names of channels that were updated
    /// * `Err(Box<dyn Error>)` - If reducer application fails, or if two
    ///   different nodes wrote the same stage-output slot in this step
    ///
    /// # State Management
    /// - Rejects a step where two different nodes wrote the same stage-output
    ///   slot (`ReducerError::Apply`, the step's `ContractBreach`)
    /// - Applies each node's partial through the registered reducers in turn
    /// - Each reducer bumps its own channel's version only when it wrote data
    /// - Preserves deterministic merge behavior for reproducible execution
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use pipeline_engine::app::App;
    /// # use pipeline_engine::node::NodePartial;
    /// # use pipeline_engine::state::RunState;
    /// # use pipeline_engine::types::NodeKind;
    /// # use pipeline_engine::message::Message;
    /// # async fn example(app: App, state: &mut RunState) -> Result<(), String> {
    /// let partials = vec![NodePartial {
    ///     messages: Some(vec![Message::assistant("test")]),
    ///     ..Default::default()
    /// }];
    /// let outcome = app.apply_barrier(state, &[NodeKind::Custom("process".into())], partials).await
    ///     .map_err(|e| format!("Error: {}", e))?;
    /// println!("Updated channels: {:?}", outcome.updated_channels);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, state, run_ids, node_partials), err)]
    pub async fn apply_barrier(
        &self,
        state: &mut RunState,
        run_ids: &[NodeKind],
        node_partials: Vec<NodePartial>,
    ) -> Result<BarrierOutcome, Box<dyn std::error::Error + Send + Sync>> {
        let fallback = NodeKind::Custom("?".to_string());
        let mut seen_slots: FxHashMap<StageSlot, &NodeKind> = FxHashMap::default();
        for (i, partial) in node_partials.iter().enumerate() {
            if let Some((slot, _)) = &partial.stage_output {
                let node_id = run_ids.get(i).unwrap_or(&fallback);
                if let Some(prior) = seen_slots.insert(*slot, node_id) {
                    return Err(Box::new(ReducerError::Apply {
                        channel: ChannelType::StageOutputs,
                        message: format!(
                            "slot {slot:?} was written by both {prior:?} and {node_id:?} in the same step"
                        ),
                    }));
                }
            }
        }

        let before = ChannelVersions::capture(state);

        for (i, partial) in node_partials.iter().enumerate() {
            let node_id = run_ids.get(i).unwrap_or(&fallback);
            tracing::debug!(node = ?node_id, "applying node partial at barrier");
            self.reducer_registry.apply_all(state, partial)?;
        }

        let after = ChannelVersions::capture(state);
        Ok(BarrierOutcome {
            updated_channels: before.diff(&after),
        })
    }
}
