use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::RunState};

/// Appends any messages on a `NodePartial` to the run's message log.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddMessages;

impl Reducer for AddMessages {
    fn apply(&self, state: &mut RunState, update: &NodePartial) -> Result<(), super::ReducerError> {
        if let Some(messages) = &update.messages
            && !messages.is_empty()
        {
            state.messages.get_mut().extend(messages.iter().cloned());
            state.messages.bump_version();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn appends_messages_and_bumps_version() {
        let mut state = RunState::new_feature_run("task");
        let before = state.messages.version();
        let update = NodePartial::new().with_messages(vec![Message::assistant("done")]);
        AddMessages.apply(&mut state, &update);
        assert_eq!(state.snapshot().messages.len(), 1);
        assert_eq!(state.messages.version(), before + 1);
    }

    #[test]
    fn empty_update_does_not_bump_version() {
        let mut state = RunState::new_feature_run("task");
        let before = state.messages.version();
        AddMessages.apply(&mut state, &NodePartial::new());
        assert_eq!(state.messages.version(), before);
    }
}
