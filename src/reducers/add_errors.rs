use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::RunState};

/// Appends any errors on a `NodePartial` to the run's error log.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddErrors;

impl Reducer for AddErrors {
    fn apply(&self, state: &mut RunState, update: &NodePartial) -> Result<(), super::ReducerError> {
        if let Some(errors) = &update.errors
            && !errors.is_empty()
        {
            state.errors.get_mut().extend(errors.iter().cloned());
            state.errors.bump_version();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::errors::{ErrorEvent, LadderError};

    #[test]
    fn appends_errors_and_bumps_version() {
        let mut state = RunState::new_feature_run("task");
        let before = state.errors.version();
        let update = NodePartial::new()
            .with_errors(vec![ErrorEvent::stage("develop", 1, LadderError::msg("boom"))]);
        AddErrors.apply(&mut state, &update);
        assert_eq!(state.snapshot().errors.len(), 1);
        assert_eq!(state.errors.version(), before + 1);
    }
}
