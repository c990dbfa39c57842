use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Channel;
use crate::types::StageSlot;

/// Holds the seven named stage-output slots (`analysis_out` .. `monitoring_out`).
///
/// A slot starts empty and is written exactly once per stage attempt; the
/// barrier merge rejects a concurrent write to an already-filled slot within
/// the same step as a `ReducerConflict` rather than silently overwriting it
/// (§4.2 "last-writer-wins" applies only across retries of the same stage,
/// never across two different stages racing for one slot).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutputsChannel {
    slots: FxHashMap<StageSlot, Value>,
    version: u32,
}

impl StageOutputsChannel {
    #[must_use]
    pub fn new(slots: FxHashMap<StageSlot, Value>, version: u32) -> Self {
        Self { slots, version }
    }

    #[must_use]
    pub fn get(&self, slot: StageSlot) -> Option<&Value> {
        self.slots.get(&slot)
    }

    pub fn set(&mut self, slot: StageSlot, value: Value) {
        self.slots.insert(slot, value);
    }

    #[must_use]
    pub fn is_filled(&self, slot: StageSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Fraction of the seven slots that have been written, for run progress.
    #[must_use]
    pub fn progress(&self) -> f64 {
        let filled = StageSlot::ALL
            .iter()
            .filter(|s| self.slots.contains_key(s))
            .count();
        filled as f64 / StageSlot::ALL.len() as f64
    }
}

impl Channel<FxHashMap<StageSlot, Value>> for StageOutputsChannel {
    fn get_mut(&mut self) -> &mut FxHashMap<StageSlot, Value> {
        &mut self.slots
    }

    fn snapshot(&self) -> FxHashMap<StageSlot, Value> {
        self.slots.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_reflects_filled_slots() {
        let mut channel = StageOutputsChannel::default();
        assert_eq!(channel.progress(), 0.0);
        channel.set(StageSlot::Analysis, json!({"summary": "ok"}));
        channel.set(StageSlot::Planning, json!({"plan": []}));
        assert!((channel.progress() - 2.0 / 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn is_filled_distinguishes_written_slots() {
        let mut channel = StageOutputsChannel::default();
        assert!(!channel.is_filled(StageSlot::Review));
        channel.set(StageSlot::Review, json!({"outcome": "approved"}));
        assert!(channel.is_filled(StageSlot::Review));
        assert!(!channel.is_filled(StageSlot::Deployment));
    }
}
