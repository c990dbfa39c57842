//! Environment-driven configuration for the pipeline engine.
//!
//! Mirrors [`crate::runtimes::runtime_config::RuntimeConfig`]'s
//! `dotenvy` + env-var resolution pattern, extended to the knobs the
//! Workflow Engine façade and its collaborators (Model-Call Adapter,
//! Stage Runtime, Subscription Hub) need that aren't session/event-bus
//! concerns.

use std::time::Duration;

use crate::runtimes::runtime_config::RuntimeConfig;

/// Top-level configuration for running the pipeline engine as a library.
///
/// Every field has an environment-variable source, loaded via `dotenvy`
/// the same way [`RuntimeConfig::resolve_sqlite_db_name`] loads
/// `SQLITE_DB_NAME`. Fields with no corresponding env var fall back to the
/// defaults named in the external-interfaces section of the design.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Model endpoint URL, from `MODEL_ENDPOINT`.
    pub model_endpoint: Option<String>,
    /// Model API credential, from `MODEL_API_KEY`.
    pub model_api_key: Option<String>,
    /// Per-run fan-out concurrency cap, from `PIPELINE_CONCURRENCY_LIMIT`.
    /// Default 8, matching the concurrency & resource model.
    pub concurrency_limit: usize,
    /// Global concurrent-runs cap, from `PIPELINE_MAX_CONCURRENT_RUNS`.
    /// Default 64.
    pub max_concurrent_runs: usize,
    /// Default per-stage timeout, from `PIPELINE_STAGE_TIMEOUT_SECS`.
    /// Default 5 minutes.
    pub stage_timeout: Duration,
    /// Default model-call timeout, from `PIPELINE_MODEL_TIMEOUT_SECS`.
    /// Default 60 seconds; streaming reads use
    /// `PIPELINE_MODEL_STREAM_TIMEOUT_SECS` (default 300s) instead.
    pub model_timeout: Duration,
    /// Streaming model-call read timeout, from `PIPELINE_MODEL_STREAM_TIMEOUT_SECS`.
    pub model_stream_timeout: Duration,
    /// Checkpoint-store connection string, from `CHECKPOINT_STORE_URL`.
    /// Overrides `RuntimeConfig::sqlite_db_name`/postgres DSN resolution
    /// when set.
    pub checkpoint_store_url: Option<String>,
    /// Subscription hub per-subscriber overflow bound, from
    /// `SUBSCRIPTION_QUEUE_CAPACITY`. Default 256.
    pub subscription_queue_capacity: usize,
    /// Session/event-bus knobs, reused as-is from the orchestration engine.
    pub runtime: RuntimeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        dotenvy::dotenv().ok();
        Self {
            model_endpoint: env_string("MODEL_ENDPOINT"),
            model_api_key: env_string("MODEL_API_KEY"),
            concurrency_limit: env_usize("PIPELINE_CONCURRENCY_LIMIT", 8),
            max_concurrent_runs: env_usize("PIPELINE_MAX_CONCURRENT_RUNS", 64),
            stage_timeout: Duration::from_secs(env_u64("PIPELINE_STAGE_TIMEOUT_SECS", 300)),
            model_timeout: Duration::from_secs(env_u64("PIPELINE_MODEL_TIMEOUT_SECS", 60)),
            model_stream_timeout: Duration::from_secs(env_u64(
                "PIPELINE_MODEL_STREAM_TIMEOUT_SECS",
                300,
            )),
            checkpoint_store_url: env_string("CHECKPOINT_STORE_URL"),
            subscription_queue_capacity: env_usize("SUBSCRIPTION_QUEUE_CAPACITY", 256),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from the environment (via `dotenvy`), same as
    /// [`Default::default`]; named explicitly for call sites that want to
    /// make the env-loading intent visible.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
