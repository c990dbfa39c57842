//! # pipeline-engine: Multi-Stage Agent Pipeline Orchestrator
//!
//! A directed-graph workflow executor purpose-built for agentic software
//! delivery pipelines: a request carries `requirements`/`task_kind` through a
//! graph of stages (`analyze → plan → develop → test → review → deploy →
//! monitor`), each stage calling out to a language model and/or capabilities,
//! merging its result into a shared, versioned run state, checkpointing, and
//! publishing progress to subscribers.
//!
//! ## Core Concepts
//!
//! - **Stages**: pluggable units of work that validate input, call the model
//!   adapter / capabilities, and return a typed delta (see [`stage`]).
//! - **RunState**: versioned, channel-based shared state threaded through a
//!   run's stages (see [`state`]).
//! - **Graph**: declarative workflow definition with conditional/fan-out
//!   routing (see [`graphs`]).
//! - **Workflow Engine**: the execution loop — scheduling, barrier merges,
//!   checkpointing, suspension/resume, cancellation (see [`runtimes`]).
//! - **Checkpoint Store**: durable snapshot persistence (see
//!   [`runtimes::checkpointer`]).
//! - **Subscription Hub**: per-run event fan-out to streaming subscribers
//!   (see [`subscription`]).
//!
//! ## Quick Start
//!
//! ```
//! use pipeline_engine::{
//!     graphs::GraphBuilder,
//!     node::{Node, NodeContext, NodePartial},
//!     message::Message,
//!     state::RunState,
//!     types::NodeKind,
//! };
//! use async_trait::async_trait;
//!
//! struct GreetingNode;
//!
//! #[async_trait]
//! impl Node for GreetingNode {
//!     async fn run(
//!         &self,
//!         _snapshot: pipeline_engine::state::StateSnapshot,
//!         _ctx: NodeContext,
//!     ) -> Result<NodePartial, pipeline_engine::node::NodeError> {
//!         let greeting = Message::assistant("Hello! How can I help you today?");
//!         Ok(NodePartial::new().with_messages(vec![greeting]))
//!     }
//! }
//!
//! let state = RunState::new_feature_run("Build a URL shortener");
//! assert_eq!(state.task_kind, pipeline_engine::run::TaskKind::Feature);
//! ```
//!
//! ## Module Guide
//!
//! - [`message`] - Message types and construction utilities
//! - [`state`] - Versioned run state and snapshots
//! - [`node`] - Low-level node trait and execution primitives
//! - [`stage`] - The Stage Runtime contract built atop `node`
//! - [`graphs`] - Workflow graph definition, compilation, and the concrete
//!   pipeline graphs
//! - [`schedulers`] - Concurrent superstep execution
//! - [`runtimes`] - Execution runtime, checkpointing, configuration
//! - [`channels`] - Channel-based state storage and versioning
//! - [`reducers`] - State merge strategies and conflict resolution
//! - [`run`] - Run entity, status lifecycle, task kind, agent executions
//! - [`artifact`] - Artifact entity
//! - [`model_adapter`] - Model-Call Adapter
//! - [`capability`] - Capability Registry
//! - [`subscription`] - Subscription Hub
//! - [`engine`] - Public façade exposing the run-control operations
//! - [`config`] - Environment-driven configuration
//! - [`error`] - Crate-wide error taxonomy

pub mod app;
pub mod artifact;
pub mod capability;
pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod graphs;
pub mod message;
pub mod model_adapter;
pub mod node;
pub mod reducers;
pub mod run;
pub mod runtimes;
pub mod schedulers;
pub mod stage;
pub mod state;
pub mod subscription;
pub mod telemetry;
pub mod types;
pub mod utils;
