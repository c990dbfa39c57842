use super::{Reducer, ReducerError};
use crate::{channels::Channel, node::NodePartial, state::RunState};

const OVERWRITABLE_KEY: &str = "overwritable";

fn is_overwritable(metadata: &std::collections::BTreeMap<String, String>) -> bool {
    metadata.get(OVERWRITABLE_KEY).map(String::as_str) == Some("true")
}

/// Merges a stage's produced artifacts into the run's artifact set.
///
/// Name-keyed union: an artifact re-emitted by the *same* stage that
/// produced it (an updated version across retries) replaces the existing
/// entry. An artifact with a name already produced by a *different* stage
/// raises `NameCollision` unless the incoming artifact's
/// `metadata["overwritable"]` is `"true"`.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct MergeArtifacts;

impl Reducer for MergeArtifacts {
    fn apply(&self, state: &mut RunState, update: &NodePartial) -> Result<(), super::ReducerError> {
        if let Some(artifacts) = &update.artifacts
            && !artifacts.is_empty()
        {
            for artifact in artifacts {
                if let Some(existing) = state.artifacts.get_mut().get(&artifact.name)
                    && existing.producer_stage != artifact.producer_stage
                    && !is_overwritable(&artifact.metadata)
                {
                    return Err(ReducerError::NameCollision {
                        name: artifact.name.clone(),
                        existing_stage: existing.producer_stage,
                        incoming_stage: artifact.producer_stage,
                    });
                }
            }
            for artifact in artifacts {
                state.artifacts.get_mut().insert(artifact.name.clone(), artifact.clone());
            }
            state.artifacts.bump_version();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, ArtifactKind};
    use crate::types::StageSlot;

    #[test]
    fn merges_artifacts_by_name_and_bumps_version() {
        let mut state = RunState::new_feature_run("task");
        let before = state.artifacts.version();
        let update = NodePartial::new().with_artifacts(vec![Artifact::text(
            "patch.diff",
            ArtifactKind::Code,
            StageSlot::Development,
            "diff",
        )]);
        MergeArtifacts.apply(&mut state, &update).unwrap();
        assert_eq!(state.snapshot().artifacts.len(), 1);
        assert_eq!(state.artifacts.version(), before + 1);
    }

    #[test]
    fn same_name_replaces_existing_entry() {
        let mut state = RunState::new_feature_run("task");
        let first = NodePartial::new().with_artifacts(vec![Artifact::text(
            "report.json",
            ArtifactKind::Data,
            StageSlot::Testing,
            "{\"pass\": false}",
        )]);
        MergeArtifacts.apply(&mut state, &first).unwrap();
        let second = NodePartial::new().with_artifacts(vec![Artifact::text(
            "report.json",
            ArtifactKind::Data,
            StageSlot::Testing,
            "{\"pass\": true}",
        )]);
        MergeArtifacts.apply(&mut state, &second).unwrap();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.artifacts.len(), 1);
        assert_eq!(
            snapshot.artifacts.get("report.json").unwrap().content_hash,
            Artifact::text("report.json", ArtifactKind::Data, StageSlot::Testing, "{\"pass\": true}").content_hash
        );
    }

    #[test]
    fn different_stage_same_name_is_a_collision() {
        let mut state = RunState::new_feature_run("task");
        let first = NodePartial::new().with_artifacts(vec![Artifact::text(
            "summary.md",
            ArtifactKind::Document,
            StageSlot::Planning,
            "plan",
        )]);
        MergeArtifacts.apply(&mut state, &first).unwrap();

        let second = NodePartial::new().with_artifacts(vec![Artifact::text(
            "summary.md",
            ArtifactKind::Document,
            StageSlot::Review,
            "review notes",
        )]);
        let err = MergeArtifacts.apply(&mut state, &second).unwrap_err();
        assert!(matches!(err, ReducerError::NameCollision { .. }));
        assert_eq!(state.snapshot().artifacts.get("summary.md").unwrap().producer_stage, StageSlot::Planning);
    }

    #[test]
    fn overwritable_metadata_allows_different_stage_to_replace() {
        let mut state = RunState::new_feature_run("task");
        let first = NodePartial::new().with_artifacts(vec![Artifact::text(
            "summary.md",
            ArtifactKind::Document,
            StageSlot::Planning,
            "plan",
        )]);
        MergeArtifacts.apply(&mut state, &first).unwrap();

        let second = NodePartial::new().with_artifacts(vec![
            Artifact::text("summary.md", ArtifactKind::Document, StageSlot::Review, "review notes")
                .with_metadata("overwritable", "true"),
        ]);
        MergeArtifacts.apply(&mut state, &second).unwrap();
        assert_eq!(state.snapshot().artifacts.get("summary.md").unwrap().producer_stage, StageSlot::Review);
    }
}
