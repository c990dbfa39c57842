use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Channel;

/// Free-form key/value scratch space (`RunState.extra`), merged by shallow
/// JSON-map overwrite (see `reducers::MapMerge`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtrasChannel {
    data: FxHashMap<String, Value>,
    version: u32,
}

impl ExtrasChannel {
    #[must_use]
    pub fn new(data: FxHashMap<String, Value>, version: u32) -> Self {
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

impl Channel<FxHashMap<String, Value>> for ExtrasChannel {
    fn get_mut(&mut self) -> &mut FxHashMap<String, Value> {
        &mut self.data
    }

    fn snapshot(&self) -> FxHashMap<String, Value> {
        self.data.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}
