use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::Channel;
use crate::artifact::Artifact;

/// Accumulates the run's artifact set, keyed by artifact name.
///
/// Merge semantics are a map union: a new artifact with a name already
/// present replaces the existing entry (stages commonly re-emit an updated
/// version of the same artifact across retries), everything else is kept.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsChannel {
    data: FxHashMap<String, Artifact>,
    version: u32,
}

impl ArtifactsChannel {
    #[must_use]
    pub fn new(data: FxHashMap<String, Artifact>, version: u32) -> Self {
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

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.data.get(name)
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.data.insert(artifact.name.clone(), artifact);
    }
}

impl Channel<FxHashMap<String, Artifact>> for ArtifactsChannel {
    fn get_mut(&mut self) -> &mut FxHashMap<String, Artifact> {
        &mut self.data
    }

    fn snapshot(&self) -> FxHashMap<String, Artifact> {
        self.data.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}
