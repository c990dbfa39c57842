//! Model-Call Adapter: a narrow trait over "call an LLM and get text back",
//! with its own retry/backoff policy distinct from the Stage Runtime's.
//!
//! Stages that need a model call go through a `ModelAdapter` rather than an
//! HTTP client directly, so the retry policy and error classification live
//! in one place and a `FakeModelAdapter` can stand in for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use miette::Diagnostic;
use thiserror::Error;

use crate::channels::token_usage::TokenUsage;

/// Base delay for the first retry.
const BACKOFF_BASE: Duration = Duration::from_secs(4);
/// Backoff grows by this multiplier each attempt.
const BACKOFF_MULTIPLIER: u32 = 2;
/// Backoff never waits longer than this between attempts.
const BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Total attempts (including the first), after which a retryable error is
/// surfaced to the caller instead of retried again.
const MAX_ATTEMPTS: u32 = 3;

/// A single model call's result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
    pub tokens: TokenUsage,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ModelAdapterError {
    #[error("model provider rate-limited the request")]
    #[diagnostic(
        code(pipeline_engine::model_adapter::rate_limited),
        help("Back off and retry; this is classified as transient.")
    )]
    RateLimited,

    #[error("prompt or response exceeded the model's token budget")]
    #[diagnostic(code(pipeline_engine::model_adapter::token_limit))]
    TokenLimitExceeded,

    #[error("model call timed out")]
    #[diagnostic(code(pipeline_engine::model_adapter::timeout))]
    TransportTimeout,

    #[error("model provider unreachable: {message}")]
    #[diagnostic(code(pipeline_engine::model_adapter::unavailable))]
    TransportUnavailable { message: String },

    #[error("model rejected request: {message}")]
    #[diagnostic(code(pipeline_engine::model_adapter::bad_request))]
    BadRequest { message: String },
}

impl ModelAdapterError {
    /// Whether this failure is worth retrying under the adapter's own
    /// backoff policy. `TokenLimitExceeded` and `BadRequest` are permanent
    /// for the given prompt; a caller has to change the input, not retry it.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ModelAdapterError::RateLimited
                | ModelAdapterError::TransportTimeout
                | ModelAdapterError::TransportUnavailable { .. }
        )
    }
}

/// A streamed chunk of model output.
pub type ModelChunk = Result<String, ModelAdapterError>;

/// Generates text from a prompt, optionally as a stream of chunks.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Issue a single non-streaming completion request.
    async fn generate(&self, prompt: &str) -> Result<ModelResponse, ModelAdapterError>;

    /// Issue a streaming completion request, yielding chunks as they arrive.
    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, ModelChunk>, ModelAdapterError>;
}

/// Runs `call` under the adapter's retry policy: full exponential backoff
/// (base 4s, ×2 per attempt, capped at 10s), up to [`MAX_ATTEMPTS`] total
/// tries, stopping early on a non-retryable error.
pub async fn call_with_backoff<T, F, Fut>(mut call: F) -> Result<T, ModelAdapterError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ModelAdapterError>>,
{
    let mut attempt = 0;
    let mut delay = BACKOFF_BASE;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable() && attempt < MAX_ATTEMPTS => {
                tokio::time::sleep(delay).await;
                delay = (delay * BACKOFF_MULTIPLIER).min(BACKOFF_CAP);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Deterministic adapter for tests: returns a canned response, or replays a
/// fixed sequence of responses/errors on successive calls so callers can
/// exercise the retry path without a real network.
pub struct FakeModelAdapter {
    responses: Vec<Result<ModelResponse, ModelAdapterError>>,
    calls: AtomicUsize,
}

impl FakeModelAdapter {
    /// Always returns the same successful response.
    #[must_use]
    pub fn constant(text: impl Into<String>, tokens: TokenUsage) -> Self {
        Self {
            responses: vec![Ok(ModelResponse {
                text: text.into(),
                tokens,
            })],
            calls: AtomicUsize::new(0),
        }
    }

    /// Replays `responses` in order, one per call; the last entry repeats
    /// once the sequence is exhausted.
    #[must_use]
    pub fn sequence(responses: Vec<Result<ModelResponse, ModelAdapterError>>) -> Self {
        assert!(!responses.is_empty(), "sequence must have at least one response");
        Self {
            responses,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn next_response(&self) -> Result<ModelResponse, ModelAdapterError> {
        let index = self.calls.fetch_add(1, Ordering::Relaxed);
        let slot = index.min(self.responses.len() - 1);
        match &self.responses[slot] {
            Ok(response) => Ok(response.clone()),
            Err(ModelAdapterError::RateLimited) => Err(ModelAdapterError::RateLimited),
            Err(ModelAdapterError::TokenLimitExceeded) => Err(ModelAdapterError::TokenLimitExceeded),
            Err(ModelAdapterError::TransportTimeout) => Err(ModelAdapterError::TransportTimeout),
            Err(ModelAdapterError::TransportUnavailable { message }) => {
                Err(ModelAdapterError::TransportUnavailable {
                    message: message.clone(),
                })
            }
            Err(ModelAdapterError::BadRequest { message }) => Err(ModelAdapterError::BadRequest {
                message: message.clone(),
            }),
        }
    }
}

#[async_trait]
impl ModelAdapter for FakeModelAdapter {
    async fn generate(&self, _prompt: &str) -> Result<ModelResponse, ModelAdapterError> {
        self.next_response()
    }

    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, ModelChunk>, ModelAdapterError> {
        let response = self.next_response()?;
        let chunks: Vec<ModelChunk> = response
            .text
            .split_whitespace()
            .map(|word| Ok(format!("{word} ")))
            .collect();
        let _ = prompt;
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

/// `rig-core`-backed production adapter, following the teacher's own
/// completion-request pattern (`CompletionClient` + `CompletionModel`,
/// `completion_request(..).preamble(..).temperature(..).build()`).
#[cfg(feature = "llm")]
pub mod rig_backed {
    use super::{ModelAdapter, ModelAdapterError, ModelChunk, ModelResponse};
    use async_trait::async_trait;
    use futures_util::stream::BoxStream;
    use rig::completion::{CompletionModel, Message};

    /// Wraps any `rig::completion::CompletionModel`, e.g.
    /// `rig::providers::ollama::Client::completion_model(name)`.
    pub struct RigModelAdapter<M: CompletionModel> {
        model: M,
        preamble: Option<String>,
        temperature: f64,
    }

    impl<M: CompletionModel> RigModelAdapter<M> {
        #[must_use]
        pub fn new(model: M) -> Self {
            Self {
                model,
                preamble: None,
                temperature: 0.7,
            }
        }

        #[must_use]
        pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
            self.preamble = Some(preamble.into());
            self
        }

        #[must_use]
        pub fn with_temperature(mut self, temperature: f64) -> Self {
            self.temperature = temperature;
            self
        }
    }

    #[async_trait]
    impl<M: CompletionModel + Send + Sync> ModelAdapter for RigModelAdapter<M> {
        async fn generate(&self, prompt: &str) -> Result<ModelResponse, ModelAdapterError> {
            let mut request = self
                .model
                .completion_request(Message::user(prompt))
                .temperature(self.temperature);
            if let Some(preamble) = &self.preamble {
                request = request.preamble(preamble.clone());
            }
            let request = request.build();

            let response =
                self.model
                    .completion(request)
                    .await
                    .map_err(|err| ModelAdapterError::TransportUnavailable {
                        message: err.to_string(),
                    })?;

            let text = response
                .choice
                .into_iter()
                .map(|choice| format!("{choice:?}"))
                .collect::<Vec<_>>()
                .join(" ");

            Ok(ModelResponse {
                text,
                tokens: super::TokenUsage::default(),
            })
        }

        async fn generate_stream(
            &self,
            prompt: &str,
        ) -> Result<BoxStream<'static, ModelChunk>, ModelAdapterError> {
            let response = self.generate(prompt).await?;
            let chunks: Vec<ModelChunk> = response
                .text
                .split_whitespace()
                .map(|word| Ok(format!("{word} ")))
                .collect();
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn fake_adapter_returns_constant_response() {
        let adapter = FakeModelAdapter::constant("hello", TokenUsage::new(10, 5));
        let response = adapter.generate("prompt").await.unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(response.tokens.total, 15);
    }

    #[tokio::test]
    async fn fake_adapter_streams_words() {
        let adapter = FakeModelAdapter::constant("a b c", TokenUsage::default());
        let stream = adapter.generate_stream("prompt").await.unwrap();
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn backoff_retries_until_success() {
        let adapter = FakeModelAdapter::sequence(vec![
            Err(ModelAdapterError::RateLimited),
            Err(ModelAdapterError::RateLimited),
            Ok(ModelResponse {
                text: "recovered".into(),
                tokens: TokenUsage::default(),
            }),
        ]);
        let result = call_with_backoff(|| adapter.generate("prompt")).await;
        assert_eq!(result.unwrap().text, "recovered");
        assert_eq!(adapter.call_count(), 3);
    }

    #[tokio::test]
    async fn backoff_stops_retrying_non_retryable_errors() {
        let adapter = FakeModelAdapter::sequence(vec![Err(ModelAdapterError::TokenLimitExceeded)]);
        let result = call_with_backoff(|| adapter.generate("prompt")).await;
        assert!(matches!(result, Err(ModelAdapterError::TokenLimitExceeded)));
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn backoff_gives_up_after_max_attempts() {
        let adapter = FakeModelAdapter::sequence(vec![Err(ModelAdapterError::RateLimited)]);
        let result = call_with_backoff(|| adapter.generate("prompt")).await;
        assert!(matches!(result, Err(ModelAdapterError::RateLimited)));
        assert_eq!(adapter.call_count(), MAX_ATTEMPTS as usize);
    }

    #[test]
    fn rate_limit_and_transport_errors_are_retryable() {
        assert!(ModelAdapterError::RateLimited.retryable());
        assert!(ModelAdapterError::TransportTimeout.retryable());
        assert!(
            ModelAdapterError::TransportUnavailable {
                message: "down".into()
            }
            .retryable()
        );
        assert!(!ModelAdapterError::TokenLimitExceeded.retryable());
        assert!(
            !ModelAdapterError::BadRequest {
                message: "bad".into()
            }
            .retryable()
        );
    }
}
