mod add_errors;
mod add_messages;
mod map_merge;
mod merge_artifacts;
mod reducer_registry;
mod sum_token_usage;
mod write_stage_slot;

pub use add_errors::AddErrors;
pub use add_messages::AddMessages;
pub use map_merge::MapMerge;
pub use merge_artifacts::MergeArtifacts;
pub use reducer_registry::*;
pub use sum_token_usage::SumTokenUsage;
pub use write_stage_slot::WriteStageSlot;

use crate::node::NodePartial;
use crate::state::RunState;
use crate::types::{ChannelType, StageSlot};
use miette::Diagnostic;
use thiserror::Error;

/// Unified reducer trait: every reducer mutates RunState using a NodePartial delta.
///
/// Channels implemented: messages/errors (append), extra (shallow JSON map
/// merge), stage_outputs (slot write with conflict detection), artifacts
/// (name-keyed union), token_usage (additive accumulation).
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut RunState, update: &NodePartial) -> Result<(), ReducerError>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum ReducerError {
    #[error("no reducers registered for channel: {0:?}")]
    #[diagnostic(
        code(pipeline_engine::reducers::unknown_channel),
        help("Use GraphBuilder::with_reducer() to register a reducer for {0:?}")
    )]
    UnknownChannel(ChannelType),

    #[error("reducer apply failed for channel {channel:?}: {message}")]
    #[diagnostic(
        code(pipeline_engine::reducers::apply),
        help("Check that your reducer implementation correctly handles the NodePartial structure")
    )]
    Apply {
        channel: ChannelType,
        message: String,
    },

    /// An artifact with this name was already produced by a different stage,
    /// and the incoming artifact is not marked `overwritable`.
    #[error(
        "artifact name collision: `{name}` was already produced by {existing_stage:?}, \
         now re-produced by {incoming_stage:?} without `metadata[\"overwritable\"] = \"true\"`"
    )]
    #[diagnostic(
        code(pipeline_engine::reducers::name_collision),
        help(
            "Give the artifact a distinct name, or set `metadata[\"overwritable\"] = \"true\"` \
             if stages are expected to share this name."
        )
    )]
    NameCollision {
        name: String,
        existing_stage: StageSlot,
        incoming_stage: StageSlot,
    },
}
