//! State management for the pipeline orchestrator.
//!
//! `RunState` carries three kinds of data: the immutable inputs a run was
//! created with, a fixed set of versioned accumulator channels stages write
//! into, and a derived read-only [`StateSnapshot`] passed to stages.
//!
//! # Channels
//!
//! - **messages**: append-only conversation/event log
//! - **errors**: append-only error log
//! - **extra**: free-form scratch metadata
//! - **stage_outputs**: the seven named stage-output slots
//! - **artifacts**: named artifact set
//! - **token_usage**: running token totals
//!
//! # Examples
//!
//! ```rust
//! use pipeline_engine::state::RunState;
//! use pipeline_engine::run::TaskKind;
//! use pipeline_engine::channels::Channel;
//!
//! let mut state = RunState::new_feature_run("Build a URL shortener");
//! assert_eq!(state.task_kind, TaskKind::Feature);
//! assert_eq!(state.requirements, "Build a URL shortener");
//!
//! state.add_message(pipeline_engine::message::Role::Assistant, "Starting analysis...");
//! assert_eq!(state.snapshot().messages.len(), 1);
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{
    artifact::Artifact,
    channels::{
        errors::ErrorEvent, token_usage::TokenUsage, ArtifactsChannel, Channel, ErrorsChannel,
        ExtrasChannel, MessagesChannel, StageOutputsChannel, TokenUsageChannel,
    },
    message::{Message, Role},
    run::TaskKind,
    types::StageSlot,
};

/// Error returned when code outside the reducer/barrier layer attempts to
/// write one of `RunState`'s immutable input fields.
///
/// Modeled separately from `crate::error::PipelineError` so `state.rs` has
/// no dependency on the top-level error aggregate; callers map this into a
/// `ContractBreach` at the point where it actually surfaces to a stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("attempted to mutate immutable run input `{field}`")]
pub struct ImmutableInputError {
    pub field: &'static str,
}

/// Immutable inputs plus mutable accumulator channels for one pipeline run.
///
/// The four input fields (`requirements`, `task_kind`, `context`,
/// `constraints`) are fixed at construction time. There is deliberately no
/// `set_requirements`/`set_task_kind`/etc: any delta that would touch them
/// is rejected upstream in the reducer layer as a `ContractBreach` rather
/// than exposed as a fallible setter here.
#[derive(Clone, Debug, PartialEq)]
pub struct RunState {
    /// The natural-language task description the run was created with.
    pub requirements: String,
    /// The kind of task, fixed at creation, driving graph routing.
    pub task_kind: TaskKind,
    /// Caller-supplied contextual key/value data (repo URL, ticket id, ...).
    pub context: FxHashMap<String, Value>,
    /// Caller-supplied constraints stages must respect (e.g. "no new deps").
    pub constraints: Vec<String>,

    pub messages: MessagesChannel,
    pub extra: ExtrasChannel,
    pub errors: ErrorsChannel,
    pub stage_outputs: StageOutputsChannel,
    pub artifacts: ArtifactsChannel,
    pub token_usage: TokenUsageChannel,
}

/// Immutable, point-in-time view of a [`RunState`] passed to stages.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub requirements: String,
    pub task_kind: TaskKind,
    pub context: FxHashMap<String, Value>,
    pub constraints: Vec<String>,

    pub messages: Vec<Message>,
    pub messages_version: u32,
    pub extra: FxHashMap<String, Value>,
    pub extra_version: u32,
    pub errors: Vec<ErrorEvent>,
    pub errors_version: u32,
    pub stage_outputs: FxHashMap<StageSlot, Value>,
    pub stage_outputs_version: u32,
    pub artifacts: FxHashMap<String, Artifact>,
    pub artifacts_version: u32,
    pub token_usage: TokenUsage,
    pub token_usage_version: u32,
}

impl StateSnapshot {
    /// Fraction of the seven stage-output slots filled, for run progress.
    #[must_use]
    pub fn progress(&self) -> f64 {
        let filled = StageSlot::ALL
            .iter()
            .filter(|s| self.stage_outputs.contains_key(s))
            .count();
        filled as f64 / StageSlot::ALL.len() as f64
    }
}

impl RunState {
    /// Creates a new run state for the given task kind and requirements
    /// text, with empty context/constraints and all accumulator channels
    /// at version 1.
    #[must_use]
    pub fn new(requirements: impl Into<String>, task_kind: TaskKind) -> Self {
        Self {
            requirements: requirements.into(),
            task_kind,
            context: FxHashMap::default(),
            constraints: Vec::new(),
            messages: MessagesChannel::new(Vec::new(), 1),
            extra: ExtrasChannel::default(),
            errors: ErrorsChannel::default(),
            stage_outputs: StageOutputsChannel::default(),
            artifacts: ArtifactsChannel::default(),
            token_usage: TokenUsageChannel::default(),
        }
    }

    /// Convenience constructor for a `TaskKind::Feature` run, the common
    /// case in tests and the quick-start example.
    #[must_use]
    pub fn new_feature_run(requirements: impl Into<String>) -> Self {
        Self::new(requirements, TaskKind::Feature)
    }

    /// Convenience constructor seeding the messages channel with a single
    /// user message, for tests and demos that don't need a full requirements
    /// description.
    #[must_use]
    pub fn new_with_user_message(user_text: &str) -> Self {
        let mut state = Self::new_feature_run(user_text);
        state.add_message(Role::User, user_text);
        state
    }

    /// Convenience constructor seeding the messages channel with an existing
    /// message history.
    #[must_use]
    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        let mut state = Self::new_feature_run("");
        *state.messages.get_mut() = messages;
        state
    }

    /// Creates a builder for constructing `RunState` with additional
    /// context/constraints/initial messages, defaulting to an empty
    /// requirements string and `TaskKind::Feature`.
    #[must_use]
    pub fn builder() -> RunStateBuilder {
        RunStateBuilder::new(String::new(), TaskKind::Feature)
    }

    /// Like [`builder`](Self::builder) but with an explicit requirements
    /// string and task kind.
    #[must_use]
    pub fn builder_for(requirements: impl Into<String>, task_kind: TaskKind) -> RunStateBuilder {
        RunStateBuilder::new(requirements.into(), task_kind)
    }

    /// Appends a message to the messages channel. The version bump is the
    /// barrier/reducer layer's responsibility, not this convenience method's.
    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_message(&mut self, role: Role, content: &str) -> &mut Self {
        self.messages.get_mut().push(Message::with_role(role, content));
        self
    }

    /// Appends a message with an arbitrary role string (e.g. a stage or tool
    /// name) that doesn't fit the closed `Role` set.
    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_message_with_role_str(&mut self, role: &str, content: &str) -> &mut Self {
        self.messages.get_mut().push(Message::new(role, content));
        self
    }

    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_extra(&mut self, key: &str, value: Value) -> &mut Self {
        self.extra.get_mut().insert(key.to_string(), value);
        self
    }

    /// Writes a stage's output into its slot. Returns an [`ImmutableInputError`]-shaped
    /// guard is not needed here (stage slots are mutable by design); callers
    /// wanting conflict detection go through `reducers::WriteStageSlot`
    /// instead, which this method does not replace — it is a direct,
    /// unguarded write for test setup and checkpoint restoration.
    pub fn set_stage_output(&mut self, slot: StageSlot, value: Value) {
        self.stage_outputs.set(slot, value);
    }

    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact);
    }

    pub fn accumulate_tokens(&mut self, delta: TokenUsage) {
        self.token_usage.accumulate(delta);
    }

    /// Creates an immutable snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            requirements: self.requirements.clone(),
            task_kind: self.task_kind,
            context: self.context.clone(),
            constraints: self.constraints.clone(),
            messages: self.messages.snapshot(),
            messages_version: self.messages.version(),
            extra: self.extra.snapshot(),
            extra_version: self.extra.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
            stage_outputs: self.stage_outputs.snapshot(),
            stage_outputs_version: self.stage_outputs.version(),
            artifacts: self.artifacts.snapshot(),
            artifacts_version: self.artifacts.version(),
            token_usage: self.token_usage.snapshot(),
            token_usage_version: self.token_usage.version(),
        }
    }
}

/// Builder for constructing a [`RunState`] with context, constraints, and
/// initial messages, primarily for tests and checkpoint-restore call sites.
#[derive(Debug)]
pub struct RunStateBuilder {
    requirements: String,
    task_kind: TaskKind,
    context: FxHashMap<String, Value>,
    constraints: Vec<String>,
    messages: Vec<Message>,
    extra: FxHashMap<String, Value>,
}

impl RunStateBuilder {
    fn new(requirements: String, task_kind: TaskKind) -> Self {
        Self {
            requirements,
            task_kind,
            context: FxHashMap::default(),
            constraints: Vec::new(),
            messages: Vec::new(),
            extra: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = requirements.into();
        self
    }

    #[must_use]
    pub fn with_task_kind(mut self, task_kind: TaskKind) -> Self {
        self.task_kind = task_kind;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, role: Role, content: &str) -> Self {
        self.messages.push(Message::with_role(role, content));
        self
    }

    /// Adds a user message. Convenience wrapper over `with_message` for
    /// call sites that don't need the full `Role` enum in scope.
    #[must_use]
    pub fn with_user_message(self, content: &str) -> Self {
        self.with_message(Role::User, content)
    }

    #[must_use]
    pub fn with_assistant_message(self, content: &str) -> Self {
        self.with_message(Role::Assistant, content)
    }

    #[must_use]
    pub fn with_system_message(self, content: &str) -> Self {
        self.with_message(Role::System, content)
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn build(self) -> RunState {
        RunState {
            requirements: self.requirements,
            task_kind: self.task_kind,
            context: self.context,
            constraints: self.constraints,
            messages: MessagesChannel::new(self.messages, 1),
            extra: ExtrasChannel::new(self.extra, 1),
            errors: ErrorsChannel::default(),
            stage_outputs: StageOutputsChannel::default(),
            artifacts: ArtifactsChannel::default(),
            token_usage: TokenUsageChannel::default(),
        }
    }
}
