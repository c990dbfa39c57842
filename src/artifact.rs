//! Artifacts produced by stages: files, diffs, reports, and other durable
//! outputs a run accumulates alongside its message log and stage slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::types::StageSlot;

/// The payload an artifact carries: either UTF-8 text or an opaque byte blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactBody {
    Text(String),
    Bytes(Vec<u8>),
}

impl ArtifactBody {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ArtifactBody::Text(s) => s.len(),
            ArtifactBody::Bytes(b) => b.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            ArtifactBody::Text(s) => s.as_bytes(),
            ArtifactBody::Bytes(b) => b,
        }
    }
}

/// A named, typed artifact produced by a stage.
///
/// Artifacts are content-addressed by `name` within a run: writing an
/// artifact with a name already present replaces it (last-writer-wins),
/// matching the stage-output slot semantics rather than the append-only
/// message/error logs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub body: ArtifactBody,
    pub size: usize,
    pub content_hash: String,
    pub metadata: BTreeMap<String, String>,
    pub producer_stage: StageSlot,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ArtifactKind, producer_stage: StageSlot, body: ArtifactBody) -> Self {
        let size = body.len();
        let content_hash = Self::hash(&body);
        Self {
            name: name.into(),
            kind,
            body,
            size,
            content_hash,
            metadata: BTreeMap::new(),
            producer_stage,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn text(name: impl Into<String>, kind: ArtifactKind, producer_stage: StageSlot, text: impl Into<String>) -> Self {
        Self::new(name, kind, producer_stage, ArtifactBody::Text(text.into()))
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn hash(body: &ArtifactBody) -> String {
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// The shape of an artifact's `body` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A source file or patch.
    Code,
    /// Prose: design notes, changelog entries, README fragments.
    Document,
    /// A configuration file (deployment manifest, env template, etc).
    Config,
    /// A diagram description (mermaid, dot, plantuml source).
    Diagram,
    /// Structured, non-code data (JSON/CSV test fixtures, metrics dumps).
    Data,
    /// A test file or test report.
    Test,
    /// A script (migration, deploy, one-off tooling).
    Script,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_for_identical_bodies() {
        let a = Artifact::text("patch.diff", ArtifactKind::Code, StageSlot::Development, "diff --git a b");
        let b = Artifact::text("patch.diff", ArtifactKind::Code, StageSlot::Development, "diff --git a b");
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.size, "diff --git a b".len());
    }

    #[test]
    fn content_hash_differs_for_different_bodies() {
        let a = Artifact::text("a", ArtifactKind::Data, StageSlot::Testing, "one");
        let b = Artifact::text("a", ArtifactKind::Data, StageSlot::Testing, "two");
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn metadata_builder_accumulates_entries() {
        let artifact = Artifact::text("a", ArtifactKind::Script, StageSlot::Deployment, "echo hi")
            .with_metadata("shell", "bash")
            .with_metadata("executable", "true");
        assert_eq!(artifact.metadata.get("shell").map(String::as_str), Some("bash"));
        assert_eq!(artifact.metadata.len(), 2);
    }
}
