//! Capability Registry: a small trait-object registry of named external
//! tools/services stages can call into (a code formatter, a test runner, a
//! deployment target — intentionally generic), with a health check and
//! auto-restart after repeated failures.
//!
//! Deliberately small: the spec calls this out as "not the hard part" of
//! the system, so it gets the same `async_trait` registry shape as
//! [`crate::runtimes::runtime_config`]'s small config structs rather than
//! anything more elaborate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Number of consecutive failed calls after which a capability is marked
/// unavailable until a health check succeeds again.
const FAILURE_THRESHOLD: u32 = 3;

/// A named external capability a stage can invoke.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Stable name this capability is registered under.
    fn name(&self) -> &str;

    /// Invoke the capability with a JSON payload, returning a JSON result.
    async fn call(&self, input: serde_json::Value) -> Result<serde_json::Value, CapabilityError>;

    /// Lightweight liveness check, run after `FAILURE_THRESHOLD` consecutive
    /// failures to decide whether the capability has recovered.
    async fn health_check(&self) -> bool {
        true
    }
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability not registered: {name}")]
    NotFound { name: String },

    #[error("capability {name} unavailable after {consecutive_failures} consecutive failures")]
    Unavailable {
        name: String,
        consecutive_failures: u32,
    },

    #[error("capability {name} call failed: {message}")]
    CallFailed { name: String, message: String },
}

struct Entry {
    capability: Arc<dyn Capability>,
    consecutive_failures: AtomicU32,
}

/// Registry of capabilities keyed by name.
///
/// Tracks consecutive failures per capability; once a capability crosses
/// [`FAILURE_THRESHOLD`], `call` first runs `health_check` and only proceeds
/// with the real call if it passes, resetting the failure count on success.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: FxHashMap<String, Entry>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) -> &mut Self {
        let name = capability.name().to_string();
        self.entries.insert(
            name,
            Entry {
                capability,
                consecutive_failures: AtomicU32::new(0),
            },
        );
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.register(capability);
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Invoke the named capability, gating the call behind a health check
    /// once the capability has accumulated `FAILURE_THRESHOLD` consecutive
    /// failures.
    pub async fn call(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| CapabilityError::NotFound {
                name: name.to_string(),
            })?;

        if entry.consecutive_failures.load(Ordering::Relaxed) >= FAILURE_THRESHOLD {
            if entry.capability.health_check().await {
                entry.consecutive_failures.store(0, Ordering::Relaxed);
            } else {
                return Err(CapabilityError::Unavailable {
                    name: name.to_string(),
                    consecutive_failures: entry.consecutive_failures.load(Ordering::Relaxed),
                });
            }
        }

        match entry.capability.call(input).await {
            Ok(output) => {
                entry.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(output)
            }
            Err(err) => {
                entry.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }
}
