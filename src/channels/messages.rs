use serde::{Deserialize, Serialize};

use super::Channel;
use crate::message::Message;

/// Append-only ordered log of human-readable events (`RunState.messages`).
///
/// Ordering within a barrier merge is by `(stage_completion_time,
/// subordering_index)`; the reducer appends in the order stage outputs are
/// presented to it, which the scheduler already orders deterministically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesChannel {
    data: Vec<Message>,
    version: u32,
}

impl MessagesChannel {
    #[must_use]
    pub fn new(data: Vec<Message>, version: u32) -> Self {
        Self { data, version }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Channel<Vec<Message>> for MessagesChannel {
    fn get_mut(&mut self) -> &mut Vec<Message> {
        &mut self.data
    }

    fn snapshot(&self) -> Vec<Message> {
        self.data.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}
