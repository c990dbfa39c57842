//! Graph compilation logic and validation.
//!
//! This module contains the logic for compiling a GraphBuilder into an
//! executable App, including structural validation.

use crate::app::App;
use crate::types::NodeKind;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while compiling a [`GraphBuilder`](super::builder::GraphBuilder)
/// into an executable [`App`].
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    /// No edge originates from the virtual `Start` node, so execution has
    /// nowhere to begin.
    #[error("graph has no edge from Start; nothing would ever run")]
    #[diagnostic(
        code(pipeline_engine::graphs::no_start_edge),
        help("Add at least one `.add_edge(NodeKind::Start, ...)` or `.add_conditional_edge(NodeKind::Start, ...)`.")
    )]
    NoStartEdge,

    /// An edge references a custom node that was never registered.
    #[error("edge references unregistered node {0:?}")]
    #[diagnostic(
        code(pipeline_engine::graphs::unknown_node),
        help("Register the node with `.add_node(...)` before wiring edges to it.")
    )]
    UnknownNode(NodeKind),
}

/// Compilation logic for GraphBuilder.
impl super::builder::GraphBuilder {
    /// Compiles the graph into an executable application.
    ///
    /// Validates the graph configuration and converts it into an [`App`] that
    /// can execute workflows.
    ///
    /// # Errors
    ///
    /// - [`GraphCompileError::NoStartEdge`] if no edge originates from `Start`
    /// - [`GraphCompileError::UnknownNode`] if an edge targets an unregistered
    ///   custom node
    ///
    /// # Examples
    ///
    /// ```
    /// use pipeline_engine::graphs::GraphBuilder;
    /// use pipeline_engine::types::NodeKind;
    ///
    /// # struct MyNode;
    /// # #[async_trait::async_trait]
    /// # impl pipeline_engine::node::Node for MyNode {
    /// #     async fn run(&self, _: pipeline_engine::state::StateSnapshot, _: pipeline_engine::node::NodeContext) -> Result<pipeline_engine::node::NodePartial, pipeline_engine::node::NodeError> {
    /// #         Ok(pipeline_engine::node::NodePartial::default())
    /// #     }
    /// # }
    ///
    /// let app = GraphBuilder::new()
    ///     .add_node(NodeKind::Custom("process".into()), MyNode)
    ///     .add_edge(NodeKind::Start, NodeKind::Custom("process".into()))
    ///     .add_edge(NodeKind::Custom("process".into()), NodeKind::End)
    ///     .compile()
    ///     .unwrap();
    /// ```
    pub fn compile(self) -> Result<App, GraphCompileError> {
        let (nodes, edges, conditional_edges, runtime_config, reducer_registry) =
            self.into_parts();

        let has_start_edge = edges
            .get(&NodeKind::Start)
            .map(|targets| !targets.is_empty())
            .unwrap_or(false)
            || conditional_edges
                .iter()
                .any(|ce| *ce.from() == NodeKind::Start);
        if !has_start_edge {
            return Err(GraphCompileError::NoStartEdge);
        }

        for (from, targets) in &edges {
            if let NodeKind::Custom(_) = from {
                if !nodes.contains_key(from) {
                    return Err(GraphCompileError::UnknownNode(from.clone()));
                }
            }
            for target in targets {
                if let NodeKind::Custom(_) = target {
                    if !nodes.contains_key(target) {
                        return Err(GraphCompileError::UnknownNode(target.clone()));
                    }
                }
            }
        }
        for ce in &conditional_edges {
            if let NodeKind::Custom(_) = ce.from() {
                if !nodes.contains_key(ce.from()) {
                    return Err(GraphCompileError::UnknownNode(ce.from().clone()));
                }
            }
        }

        Ok(App::from_parts(
            nodes,
            edges,
            conditional_edges,
            runtime_config,
            reducer_registry,
        ))
    }
}
