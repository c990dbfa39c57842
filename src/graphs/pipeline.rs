//! Concrete graph constructions: `analyze -> plan -> develop -> test ->
//! review -> deploy -> monitor`, a hotfix shortcut that skips planning and
//! review, and a parallel-development variant that fans development out
//! across frontend/backend/infrastructure before merging back.
//!
//! Grounded on `create_main_workflow`/`create_hotfix_workflow`/
//! `create_parallel_development_workflow` and their routing functions, kept
//! semantically identical (hotfix shortcut, rework bound of three, success
//! gating at each conditional hop) but expressed through [`GraphBuilder`]'s
//! unconditional/conditional edges instead of a state-graph DSL.
//!
//! Stage business logic (what `analyze`/`develop`/etc. actually produce) is
//! out of scope here; each stage below is a thin, deterministic placeholder
//! that writes a plausible output shape into its slot, enough to exercise
//! routing, fan-out, and the barrier/reducer path end to end.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::artifact::{Artifact, ArtifactBody, ArtifactKind};
use crate::graphs::{EdgePredicate, GraphBuilder};
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::run::{ReviewOutcome, TaskKind};
use crate::stage::{Stage, StageError, StageNodeAdapter, StageResult, StageSpec};
use crate::state::StateSnapshot;
use crate::types::{NodeKind, StageSlot};

const MAX_REWORK_ATTEMPTS: u64 = 3;

fn custom(name: &str) -> NodeKind {
    NodeKind::Custom(name.to_string())
}

/// Deterministic stage stub: always succeeds, writing `output` into its slot
/// and, optionally, a handful of placeholder artifacts alongside it.
struct StubStage {
    name: &'static str,
    slot: StageSlot,
    output: Value,
    artifacts: Vec<Artifact>,
}

#[async_trait]
impl Stage for StubStage {
    fn name(&self) -> &str {
        self.name
    }

    fn slot(&self) -> StageSlot {
        self.slot
    }

    fn validate_input(&self, _snapshot: &StateSnapshot) -> Result<(), StageError> {
        Ok(())
    }

    async fn execute(
        &self,
        _snapshot: &StateSnapshot,
        _ctx: &NodeContext,
    ) -> Result<StageResult, StageError> {
        let partial = NodePartial::new()
            .with_stage_output(self.slot, self.output.clone())
            .with_artifacts(self.artifacts.clone());
        Ok(StageResult::ok(partial))
    }
}

fn stub_node(name: &'static str, slot: StageSlot, output: Value) -> Arc<dyn Node> {
    stub_node_with_artifacts(name, slot, output, Vec::new())
}

fn stub_node_with_artifacts(name: &'static str, slot: StageSlot, output: Value, artifacts: Vec<Artifact>) -> Arc<dyn Node> {
    Arc::new(StageNodeAdapter::new(
        Arc::new(StubStage {
            name,
            slot,
            output,
            artifacts,
        }),
        StageSpec::default(),
    ))
}

fn analysis_node() -> Arc<dyn Node> {
    stub_node("analyze_task", StageSlot::Analysis, json!({"summary": "analyzed"}))
}

fn planning_node() -> Arc<dyn Node> {
    stub_node(
        "planning",
        StageSlot::Planning,
        json!({"tasks": [
            {"category": "frontend", "name": "build UI"},
            {"category": "backend", "name": "build API"},
            {"category": "infrastructure", "name": "provision env"},
        ]}),
    )
}

fn development_node() -> Arc<dyn Node> {
    let artifact = Artifact::text(
        "main.rs",
        ArtifactKind::Code,
        StageSlot::Development,
        "// generated by the development stage\n",
    );
    stub_node_with_artifacts(
        "development",
        StageSlot::Development,
        json!({"files": ["main.rs"]}),
        vec![artifact],
    )
}

fn testing_node() -> Arc<dyn Node> {
    let artifact = Artifact::text(
        "main_test.rs",
        ArtifactKind::Test,
        StageSlot::Testing,
        "// generated by the testing stage\n",
    );
    stub_node_with_artifacts("testing", StageSlot::Testing, json!({"passed": true}), vec![artifact])
}

fn review_node() -> Arc<dyn Node> {
    stub_node(
        "review",
        StageSlot::Review,
        json!({"outcome": "approved"}),
    )
}

fn deployment_node() -> Arc<dyn Node> {
    let artifact = Artifact::text(
        "deploy.yaml",
        ArtifactKind::Config,
        StageSlot::Deployment,
        "# generated by the deployment stage\n",
    );
    stub_node_with_artifacts(
        "deployment",
        StageSlot::Deployment,
        json!({"success": true}),
        vec![artifact],
    )
}

fn monitoring_node() -> Arc<dyn Node> {
    stub_node("monitoring", StageSlot::Monitoring, json!({"configured": true}))
}

/// Category-scoped development node for the parallel-development graph;
/// writes its result under `extra["{category}_result"]` rather than the
/// shared `Development` slot so three of these can run in the same
/// superstep without conflicting.
struct CategoryDevelopmentStage {
    category: &'static str,
}

#[async_trait]
impl Stage for CategoryDevelopmentStage {
    fn name(&self) -> &str {
        self.category
    }

    fn slot(&self) -> StageSlot {
        StageSlot::Development
    }

    fn validate_input(&self, _snapshot: &StateSnapshot) -> Result<(), StageError> {
        Ok(())
    }

    async fn execute(
        &self,
        _snapshot: &StateSnapshot,
        _ctx: &NodeContext,
    ) -> Result<StageResult, StageError> {
        let mut extra = rustc_hash::FxHashMap::default();
        extra.insert(
            format!("{}_result", self.category),
            json!({"files": [format!("{}_output.rs", self.category)]}),
        );
        Ok(StageResult::ok(NodePartial::new().with_extra(extra)))
    }
}

fn category_development_node(category: &'static str) -> Arc<dyn Node> {
    Arc::new(StageNodeAdapter::new(
        Arc::new(CategoryDevelopmentStage { category }),
        StageSpec::default(),
    ))
}

/// Combines the three category results left in `extra` into one
/// `Development` slot entry, mirroring `merge_development_results`.
struct MergeDevelopmentResultsNode;

#[async_trait]
impl Node for MergeDevelopmentResultsNode {
    async fn run(&self, snapshot: StateSnapshot, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
        let category_result = |key: &str| -> Value {
            snapshot.extra.get(key).cloned().unwrap_or(json!({}))
        };
        let frontend = category_result("frontend_result");
        let backend = category_result("backend_result");
        let infrastructure = category_result("infrastructure_result");

        let files = |v: &Value| -> Vec<Value> {
            v.get("files")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        let mut generated_files = files(&frontend);
        generated_files.extend(files(&backend));
        generated_files.extend(files(&infrastructure));

        let merged = json!({
            "frontend": frontend,
            "backend": backend,
            "infrastructure": infrastructure,
            "total_artifacts": generated_files.len(),
            "generated_files": generated_files,
        });

        Ok(NodePartial::new().with_stage_output(StageSlot::Development, merged))
    }
}

/// Reads the `should_continue` and `task_kind` inputs and decides whether to
/// run the full planning flow, skip straight to development for a hotfix, or
/// stop the run after analysis.
#[must_use]
pub fn route_after_analysis() -> EdgePredicate {
    Arc::new(|snapshot: StateSnapshot| {
        let should_continue = snapshot
            .extra
            .get("should_continue")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if !should_continue {
            return vec!["End".to_string()];
        }
        match snapshot.task_kind {
            TaskKind::Hotfix => vec!["development".to_string()],
            _ => vec!["planning".to_string()],
        }
    })
}

/// Reads the review stage's output and the accumulated rework count and
/// decides between deployment, another development pass, or ending the run.
#[must_use]
pub fn route_after_review() -> EdgePredicate {
    Arc::new(|snapshot: StateSnapshot| {
        let outcome = snapshot
            .stage_outputs
            .get(&StageSlot::Review)
            .and_then(|v| v.get("outcome"))
            .and_then(Value::as_str)
            .and_then(|s| match s {
                "approved" => Some(ReviewOutcome::Approved),
                "approved_with_comments" => Some(ReviewOutcome::ApprovedWithComments),
                "needs_changes" => Some(ReviewOutcome::NeedsChanges),
                "rejected" => Some(ReviewOutcome::Rejected),
                _ => None,
            });

        let skip_deployment = snapshot
            .extra
            .get("skip_deployment")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let rework_count = snapshot
            .extra
            .get("rework_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        match outcome {
            Some(outcome) if outcome.routes_to_deploy() => {
                if skip_deployment {
                    vec!["End".to_string()]
                } else {
                    vec!["deployment".to_string()]
                }
            }
            Some(ReviewOutcome::NeedsChanges) => {
                if rework_count >= MAX_REWORK_ATTEMPTS {
                    vec!["End".to_string()]
                } else {
                    vec!["development".to_string()]
                }
            }
            _ => vec!["End".to_string()],
        }
    })
}

/// Routes to monitoring on a successful deployment, otherwise ends the run.
#[must_use]
pub fn route_after_deployment() -> EdgePredicate {
    Arc::new(|snapshot: StateSnapshot| {
        let success = snapshot
            .stage_outputs
            .get(&StageSlot::Deployment)
            .and_then(|v| v.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if success {
            vec!["monitoring".to_string()]
        } else {
            vec!["End".to_string()]
        }
    })
}

/// Splits planning's categorized tasks into one fan-out target per non-empty
/// category, mirroring `split_development_tasks`'s `Send`-based fan-out.
#[must_use]
pub fn route_after_planning() -> EdgePredicate {
    Arc::new(|snapshot: StateSnapshot| {
        let tasks = snapshot
            .stage_outputs
            .get(&StageSlot::Planning)
            .and_then(|v| v.get("tasks"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let has_category = |category: &str| {
            tasks
                .iter()
                .any(|t| t.get("category").and_then(Value::as_str) == Some(category))
        };

        let mut targets = Vec::new();
        if has_category("frontend") {
            targets.push("frontend_development".to_string());
        }
        if has_category("backend") {
            targets.push("backend_development".to_string());
        }
        if has_category("infrastructure") {
            targets.push("infrastructure_development".to_string());
        }
        if targets.is_empty() {
            targets.push("development".to_string());
        }
        targets
    })
}

/// The full development pipeline: `analyze -> plan -> develop -> test ->
/// review -> deploy -> monitor`, with the analysis and review stages each
/// branching via conditional edges.
pub fn build_main_graph() -> Result<crate::app::App, crate::graphs::GraphCompileError> {
    GraphBuilder::new()
        .add_node(custom("analyze_task"), WrappedNode(analysis_node()))
        .add_node(custom("planning"), WrappedNode(planning_node()))
        .add_node(custom("development"), WrappedNode(development_node()))
        .add_node(custom("testing"), WrappedNode(testing_node()))
        .add_node(custom("review"), WrappedNode(review_node()))
        .add_node(custom("deployment"), WrappedNode(deployment_node()))
        .add_node(custom("monitoring"), WrappedNode(monitoring_node()))
        .add_edge(NodeKind::Start, custom("analyze_task"))
        .add_conditional_edge(custom("analyze_task"), route_after_analysis())
        .add_edge(custom("planning"), custom("development"))
        .add_edge(custom("development"), custom("testing"))
        .add_edge(custom("testing"), custom("review"))
        .add_conditional_edge(custom("review"), route_after_review())
        .add_conditional_edge(custom("deployment"), route_after_deployment())
        .add_edge(custom("monitoring"), NodeKind::End)
        .compile()
}

/// Hotfix-only pipeline: skips planning and review, deploying as soon as
/// tests pass.
pub fn build_hotfix_graph() -> Result<crate::app::App, crate::graphs::GraphCompileError> {
    let deploy_if_tests_passed: EdgePredicate = Arc::new(|snapshot: StateSnapshot| {
        let passed = snapshot
            .stage_outputs
            .get(&StageSlot::Testing)
            .and_then(|v| v.get("passed"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if passed {
            vec!["deployment".to_string()]
        } else {
            vec!["End".to_string()]
        }
    });

    GraphBuilder::new()
        .add_node(custom("analyze_task"), WrappedNode(analysis_node()))
        .add_node(custom("development"), WrappedNode(development_node()))
        .add_node(custom("testing"), WrappedNode(testing_node()))
        .add_node(custom("deployment"), WrappedNode(deployment_node()))
        .add_edge(NodeKind::Start, custom("analyze_task"))
        .add_edge(custom("analyze_task"), custom("development"))
        .add_edge(custom("development"), custom("testing"))
        .add_conditional_edge(custom("testing"), deploy_if_tests_passed)
        .add_edge(custom("deployment"), NodeKind::End)
        .compile()
}

/// Development fans out across frontend/backend/infrastructure categories
/// (as determined by planning's task breakdown) and merges back before
/// testing continues.
pub fn build_parallel_development_graph() -> Result<crate::app::App, crate::graphs::GraphCompileError> {
    GraphBuilder::new()
        .add_node(custom("analyze_task"), WrappedNode(analysis_node()))
        .add_node(custom("planning"), WrappedNode(planning_node()))
        .add_node(
            custom("frontend_development"),
            WrappedNode(category_development_node("frontend")),
        )
        .add_node(
            custom("backend_development"),
            WrappedNode(category_development_node("backend")),
        )
        .add_node(
            custom("infrastructure_development"),
            WrappedNode(category_development_node("infrastructure")),
        )
        .add_node(custom("development"), WrappedNode(development_node()))
        .add_node(
            custom("merge_results"),
            WrappedNode(Arc::new(MergeDevelopmentResultsNode)),
        )
        .add_node(custom("testing"), WrappedNode(testing_node()))
        .add_edge(NodeKind::Start, custom("analyze_task"))
        .add_edge(custom("analyze_task"), custom("planning"))
        .add_conditional_edge(custom("planning"), route_after_planning())
        .add_edge(custom("frontend_development"), custom("merge_results"))
        .add_edge(custom("backend_development"), custom("merge_results"))
        .add_edge(custom("infrastructure_development"), custom("merge_results"))
        .add_edge(custom("development"), custom("merge_results"))
        .add_edge(custom("merge_results"), custom("testing"))
        .add_edge(custom("testing"), NodeKind::End)
        .compile()
}

/// `GraphBuilder::add_node` takes `impl Node`, not `Arc<dyn Node>`; this
/// thin wrapper lets the `*_node()` helpers above share a single `Arc<dyn
/// Node>` allocation while still satisfying that bound.
struct WrappedNode(Arc<dyn Node>);

#[async_trait]
impl Node for WrappedNode {
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodePartial, NodeError> {
        self.0.run(snapshot, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn snapshot_with(
        task_kind: TaskKind,
        stage_outputs: Vec<(StageSlot, Value)>,
        extra: Vec<(&str, Value)>,
    ) -> StateSnapshot {
        let mut stage_map = FxHashMap::default();
        for (slot, value) in stage_outputs {
            stage_map.insert(slot, value);
        }
        let mut extra_map = FxHashMap::default();
        for (key, value) in extra {
            extra_map.insert(key.to_string(), value);
        }
        StateSnapshot {
            requirements: String::new(),
            task_kind,
            context: FxHashMap::default(),
            constraints: Vec::new(),
            messages: Vec::new(),
            messages_version: 1,
            extra: extra_map,
            extra_version: 1,
            errors: Vec::new(),
            errors_version: 1,
            stage_outputs: stage_map,
            stage_outputs_version: 1,
            artifacts: FxHashMap::default(),
            artifacts_version: 1,
            token_usage: Default::default(),
            token_usage_version: 1,
        }
    }

    #[test]
    fn hotfix_tasks_skip_planning() {
        let predicate = route_after_analysis();
        let targets = predicate(snapshot_with(TaskKind::Hotfix, vec![], vec![]));
        assert_eq!(targets, vec!["development".to_string()]);
    }

    #[test]
    fn feature_tasks_route_to_planning() {
        let predicate = route_after_analysis();
        let targets = predicate(snapshot_with(TaskKind::Feature, vec![], vec![]));
        assert_eq!(targets, vec!["planning".to_string()]);
    }

    #[test]
    fn should_continue_false_ends_early() {
        let predicate = route_after_analysis();
        let targets = predicate(snapshot_with(
            TaskKind::Feature,
            vec![],
            vec![("should_continue", json!(false))],
        ));
        assert_eq!(targets, vec!["End".to_string()]);
    }

    #[test]
    fn review_approved_routes_to_deployment() {
        let predicate = route_after_review();
        let targets = predicate(snapshot_with(
            TaskKind::Feature,
            vec![(StageSlot::Review, json!({"outcome": "approved"}))],
            vec![],
        ));
        assert_eq!(targets, vec!["deployment".to_string()]);
    }

    #[test]
    fn review_approved_but_skip_deployment_ends() {
        let predicate = route_after_review();
        let targets = predicate(snapshot_with(
            TaskKind::Feature,
            vec![(StageSlot::Review, json!({"outcome": "approved"}))],
            vec![("skip_deployment", json!(true))],
        ));
        assert_eq!(targets, vec!["End".to_string()]);
    }

    #[test]
    fn review_needs_changes_routes_back_to_development() {
        let predicate = route_after_review();
        let targets = predicate(snapshot_with(
            TaskKind::Feature,
            vec![(StageSlot::Review, json!({"outcome": "needs_changes"}))],
            vec![("rework_count", json!(1))],
        ));
        assert_eq!(targets, vec!["development".to_string()]);
    }

    #[test]
    fn review_needs_changes_past_rework_bound_ends() {
        let predicate = route_after_review();
        let targets = predicate(snapshot_with(
            TaskKind::Feature,
            vec![(StageSlot::Review, json!({"outcome": "needs_changes"}))],
            vec![("rework_count", json!(3))],
        ));
        assert_eq!(targets, vec!["End".to_string()]);
    }

    #[test]
    fn deployment_success_routes_to_monitoring() {
        let predicate = route_after_deployment();
        let targets = predicate(snapshot_with(
            TaskKind::Feature,
            vec![(StageSlot::Deployment, json!({"success": true}))],
            vec![],
        ));
        assert_eq!(targets, vec!["monitoring".to_string()]);
    }

    #[test]
    fn deployment_failure_ends_run() {
        let predicate = route_after_deployment();
        let targets = predicate(snapshot_with(
            TaskKind::Feature,
            vec![(StageSlot::Deployment, json!({"success": false}))],
            vec![],
        ));
        assert_eq!(targets, vec!["End".to_string()]);
    }

    #[test]
    fn planning_fans_out_to_all_present_categories() {
        let predicate = route_after_planning();
        let targets = predicate(snapshot_with(
            TaskKind::Feature,
            vec![(
                StageSlot::Planning,
                json!({"tasks": [
                    {"category": "frontend"},
                    {"category": "backend"},
                ]}),
            )],
            vec![],
        ));
        assert_eq!(
            targets,
            vec!["frontend_development".to_string(), "backend_development".to_string()]
        );
    }

    #[test]
    fn main_graph_compiles() {
        build_main_graph().unwrap();
    }

    #[test]
    fn hotfix_graph_compiles() {
        build_hotfix_graph().unwrap();
    }

    #[test]
    fn parallel_development_graph_compiles() {
        build_parallel_development_graph().unwrap();
    }
}
