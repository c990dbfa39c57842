use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::RunState};

/// Writes a stage's output into its named slot.
///
/// Conflict detection for two different nodes racing to fill the same slot
/// within a single superstep happens at the barrier merge
/// (`App::apply_barrier`), before any partial reaches a reducer: by the time
/// `WriteStageSlot` runs, the slot has already been cleared to receive a
/// single winning value for this step. A stage retrying its own attempt
/// across supersteps simply overwrites its own prior value, which is the
/// last-writer-wins case this reducer implements directly.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct WriteStageSlot;

impl Reducer for WriteStageSlot {
    fn apply(&self, state: &mut RunState, update: &NodePartial) -> Result<(), super::ReducerError> {
        if let Some((slot, value)) = &update.stage_output {
            state.stage_outputs.get_mut().insert(*slot, value.clone());
            state.stage_outputs.bump_version();
        }
        Ok(())
    }
}
