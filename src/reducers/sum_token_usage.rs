use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::RunState};

/// Accumulates a stage attempt's reported token consumption into the run total.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct SumTokenUsage;

impl Reducer for SumTokenUsage {
    fn apply(&self, state: &mut RunState, update: &NodePartial) -> Result<(), super::ReducerError> {
        if let Some(delta) = update.tokens {
            state.token_usage.accumulate(delta);
            state.token_usage.bump_version();
        }
        Ok(())
    }
}
