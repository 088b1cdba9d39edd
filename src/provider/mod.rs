//! Document source module.
//!
//! This module defines the interface for fetching candidate documents for an
//! expanded query and includes the PubMed E-utilities implementation.
//!
//! The `DocumentSource` trait abstracts the bibliographic backend, allowing the
//! search pipeline to be exercised against fixed document sets in tests
//! without coupling to a remote service.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Document;

pub mod medline;
pub mod pubmed;

pub use pubmed::{PubMedConfig, PubMedSource};

/// Errors that can occur when fetching documents from a source.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to parse a whole response payload
    #[error("Parse error: {0}")]
    ParseError(String),

    /// API rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for fetching documents matching a boolean search expression.
///
/// # Design Notes
///
/// - The expression is passed through verbatim; sources do not validate it
/// - Records that cannot be mapped to a [`Document`] are skipped, not fatal
/// - Documents may have an empty abstract; filtering happens downstream
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch up to `max_results` documents matching `query`.
    ///
    /// # Returns
    /// Zero or more documents, in source relevance order
    ///
    /// # Errors
    /// Returns `ProviderError` if the source is misconfigured or unreachable
    async fn fetch(&self, query: &str, max_results: usize) -> ProviderResult<Vec<Document>>;

    /// Get a human-readable name of this source.
    ///
    /// This is useful for logging and debugging.
    fn name(&self) -> &str;
}
