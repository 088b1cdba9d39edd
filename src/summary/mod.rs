//! Result summarization module.
//!
//! Summaries are produced for the highest-ranked results only. A summarizer
//! may fail for any reason; the search pipeline treats every failure as
//! recoverable and substitutes a truncated abstract.
//!
//! Implementations:
//! - [`GeminiSummarizer`]: remote generative model over HTTP
//! - [`ExtractiveSummarizer`]: local sentence extraction, no model
//! - [`FallbackSummarizer`]: tries one summarizer, then another

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub mod extractive;
pub mod gemini;

pub use extractive::ExtractiveSummarizer;
pub use gemini::{GeminiConfig, GeminiSummarizer};

/// Errors that can occur while summarizing a document.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Remote summarization was not requested for this call
    #[error("Remote summarization disabled")]
    Disabled,

    /// No API key or endpoint available for the remote service
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Transport failure or non-success status
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with a payload outside the expected schema
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Nothing to summarize
    #[error("Empty input")]
    EmptyInput,
}

/// Result type for summarization.
pub type SummaryResult<T> = Result<T, SummaryError>;

/// One document to summarize plus per-call options.
#[derive(Debug, Clone, Default)]
pub struct SummaryRequest {
    pub title: String,
    pub body: String,
    /// Whether remote services may be contacted for this call
    pub allow_remote: bool,
    /// Caller-supplied credential, preferred over a configured one
    pub api_key: Option<String>,
}

impl SummaryRequest {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_remote(mut self, allow_remote: bool, api_key: Option<String>) -> Self {
        self.allow_remote = allow_remote;
        self.api_key = api_key;
        self
    }
}

/// Trait for document summarizers.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a short summary of one document.
    ///
    /// # Errors
    /// Returns `SummaryError` on any failure; callers are expected to recover
    async fn summarize(&self, request: &SummaryRequest) -> SummaryResult<String>;

    /// Human-readable name, used in logs.
    fn name(&self) -> &str;
}

/// Runs `primary` and falls back to `secondary` if it fails.
pub struct FallbackSummarizer {
    primary: Arc<dyn Summarizer>,
    secondary: Arc<dyn Summarizer>,
}

impl FallbackSummarizer {
    pub fn new(primary: Arc<dyn Summarizer>, secondary: Arc<dyn Summarizer>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Summarizer for FallbackSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> SummaryResult<String> {
        match self.primary.summarize(request).await {
            Ok(summary) => Ok(summary),
            Err(SummaryError::Disabled) => self.secondary.summarize(request).await,
            Err(e) => {
                warn!(
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    error = %e,
                    "Summarizer failed, trying fallback"
                );
                self.secondary.summarize(request).await
            }
        }
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Summarizer returning a fixed outcome and counting calls.
    pub(crate) struct FixedSummarizer {
        pub reply: Option<String>,
        pub calls: AtomicUsize,
    }

    impl FixedSummarizer {
        pub(crate) fn ok(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _request: &SummaryRequest) -> SummaryResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| SummaryError::Network("unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_fallback_uses_primary_when_it_succeeds() {
        let primary = Arc::new(FixedSummarizer::ok("primary"));
        let secondary = Arc::new(FixedSummarizer::ok("secondary"));
        let chain = FallbackSummarizer::new(primary.clone(), secondary.clone());

        let out = chain.summarize(&SummaryRequest::new("t", "b")).await.unwrap();
        assert_eq!(out, "primary");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_uses_secondary_on_failure() {
        let primary = Arc::new(FixedSummarizer::failing());
        let secondary = Arc::new(FixedSummarizer::ok("secondary"));
        let chain = FallbackSummarizer::new(primary.clone(), secondary);

        let out = chain.summarize(&SummaryRequest::new("t", "b")).await.unwrap();
        assert_eq!(out, "secondary");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_fails_when_both_fail() {
        let chain = FallbackSummarizer::new(
            Arc::new(FixedSummarizer::failing()),
            Arc::new(FixedSummarizer::failing()),
        );
        assert!(chain.summarize(&SummaryRequest::new("t", "b")).await.is_err());
    }

    #[test]
    fn test_request_builder() {
        let request = SummaryRequest::new("Title", "Body").with_remote(true, Some("k".to_string()));
        assert_eq!(request.title, "Title");
        assert!(request.allow_remote);
        assert_eq!(request.api_key.as_deref(), Some("k"));
        assert!(!SummaryRequest::new("a", "b").allow_remote);
    }
}
