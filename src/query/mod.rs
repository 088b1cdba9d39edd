//! Retrieval orchestration module.
//!
//! This module runs one search end to end: it expands the raw query into a
//! boolean expression, fetches candidate documents, embeds the ones that have
//! an abstract, ranks them against the embedded query with an exact
//! inner-product index, and attaches short summaries to the top results.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pubmed_semantic_search::embedding::{EmbedderRegistry, OnnxModelLoader};
//! use pubmed_semantic_search::provider::{PubMedConfig, PubMedSource};
//! use pubmed_semantic_search::query::{SearchEngine, SearchQuery, SemanticSearchEngine};
//! use pubmed_semantic_search::summary::ExtractiveSummarizer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = PubMedSource::new(PubMedConfig {
//!     email: Some("me@example.org".to_string()),
//!     ..PubMedConfig::default()
//! })?;
//! let embedders = EmbedderRegistry::new(Arc::new(OnnxModelLoader::new("models", 512)));
//!
//! let engine = SemanticSearchEngine::new(
//!     Arc::new(source),
//!     Arc::new(embedders),
//!     Arc::new(ExtractiveSummarizer::new()),
//!     "microsoft/BiomedNLP-PubMedBERT-base-uncased-abstract",
//! );
//!
//! let response = engine.search(&SearchQuery::new("heart attack")).await?;
//! for result in response.results {
//!     println!("{} - Score: {:.3}", result.document.title, result.score);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{EmbedderRegistry, EmbeddingError};
use crate::expansion::{ExpandedQuery, TermExpander};
use crate::index::{FlatIndex, IndexError};
use crate::models::{Document, SearchResponse, SearchResult};
use crate::provider::{DocumentSource, ProviderError};
use crate::summary::{SummaryRequest, Summarizer};

/// Number of top results that receive a summary.
pub const SUMMARIZED_RESULTS: usize = 5;

/// Characters of the abstract kept when every summarizer fails.
pub const FALLBACK_SUMMARY_CHARS: usize = 400;

/// Default document fetch cap.
pub const DEFAULT_MAX_RESULTS: usize = 200;

/// Default number of ranked results.
pub const DEFAULT_TOP_K: usize = 10;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Required configuration (such as a source credential) is missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The embedding model could not be loaded or run
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The document source failed
    #[error("Document source error: {0}")]
    Source(String),

    /// The vector index could not be built or searched
    #[error("Index error: {0}")]
    Index(String),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

impl From<ProviderError> for QueryError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ConfigError(msg) => QueryError::Configuration(msg),
            other => QueryError::Source(other.to_string()),
        }
    }
}

impl From<EmbeddingError> for QueryError {
    fn from(err: EmbeddingError) -> Self {
        QueryError::Embedding(err.to_string())
    }
}

impl From<IndexError> for QueryError {
    fn from(err: IndexError) -> Self {
        QueryError::Index(err.to_string())
    }
}

/// Search query parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Raw natural-language query; embedded verbatim
    pub query: String,

    /// Maximum number of documents fetched from the source
    pub max_results: usize,

    /// Maximum number of ranked results returned
    pub top_k: usize,

    /// Embedding model identifier; the engine default when `None`
    pub model_name: Option<String>,

    /// Append a MeSH group to the boolean query
    pub use_mesh: bool,

    /// Allow the remote summarizer for the top results
    pub summarize: bool,

    /// Credential for the remote summarizer
    pub summary_api_key: Option<String>,
}

impl SearchQuery {
    /// Create a query with default parameters.
    ///
    /// # Arguments
    /// * `query` - The raw query text
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: DEFAULT_MAX_RESULTS,
            top_k: DEFAULT_TOP_K,
            model_name: None,
            use_mesh: true,
            summarize: false,
            summary_api_key: None,
        }
    }

    /// Check the numeric parameters.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidQuery` if the fetch cap or top-k is zero
    pub fn validate(&self) -> QueryResult<()> {
        if self.max_results == 0 {
            return Err(QueryError::InvalidQuery("retmax must be at least 1".to_string()));
        }
        if self.top_k == 0 {
            return Err(QueryError::InvalidQuery("top_k must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Trait for search engines.
///
/// Implementations coordinate query expansion, document retrieval, embedding
/// and ranking, and return a self-describing response.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a search query.
    ///
    /// # Arguments
    /// * `query` - The search query parameters
    ///
    /// # Returns
    /// The response with results sorted by relevance (highest score first)
    ///
    /// # Errors
    /// Returns `QueryError` only for configuration, embedding, source and
    /// index failures; empty results are not errors
    async fn search(&self, query: &SearchQuery) -> QueryResult<SearchResponse>;

    /// Render the boolean expression a query would be fetched with.
    fn expand(&self, query: &str, use_mesh: bool) -> ExpandedQuery;
}

/// Truncate `body` to [`FALLBACK_SUMMARY_CHARS`] characters and append an
/// ellipsis.
pub fn truncated_summary(body: &str) -> String {
    let mut summary: String = body.chars().take(FALLBACK_SUMMARY_CHARS).collect();
    summary.push_str("...");
    summary
}

/// Search engine combining lexical expansion with dense-vector ranking.
///
/// The document batch and the vector index live only for the duration of one
/// call; the embedding models are shared through the registry.
pub struct SemanticSearchEngine {
    expander: TermExpander,
    source: Arc<dyn DocumentSource>,
    embedders: Arc<EmbedderRegistry>,
    summarizer: Arc<dyn Summarizer>,
    default_model: String,
    document_batch_size: usize,
    query_batch_size: usize,
}

impl SemanticSearchEngine {
    /// Create a new search engine.
    ///
    /// # Arguments
    /// * `source` - Where candidate documents come from
    /// * `embedders` - Shared, lazily loaded embedding models
    /// * `summarizer` - Summarizer for the top results
    /// * `default_model` - Model used when a query names none
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedders: Arc<EmbedderRegistry>,
        summarizer: Arc<dyn Summarizer>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            expander: TermExpander::default(),
            source,
            embedders,
            summarizer,
            default_model: default_model.into(),
            document_batch_size: 8,
            query_batch_size: 1,
        }
    }

    /// Override the embedding batch sizes for documents and queries.
    pub fn with_batch_sizes(mut self, documents: usize, queries: usize) -> Self {
        self.document_batch_size = documents.max(1);
        self.query_batch_size = queries.max(1);
        self
    }

    /// Replace the synonym tables.
    pub fn with_expander(mut self, expander: TermExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Embed the abstracts and the query, returning the document vectors and
    /// the single query vector.
    async fn embed(
        &self,
        model: &str,
        texts: Vec<String>,
        query: String,
    ) -> QueryResult<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
        let embedder = self.embedders.get(model).await?;
        let (doc_batch, query_batch) = (self.document_batch_size, self.query_batch_size);

        tokio::task::spawn_blocking(move || {
            let documents = embedder.encode(&texts, doc_batch, true)?;
            let query = embedder.encode(&[query], query_batch, true)?;
            Ok::<_, EmbeddingError>((documents, query))
        })
        .await
        .map_err(|e| QueryError::Embedding(format!("embedding task failed: {}", e)))?
        .map_err(QueryError::from)
    }

    /// Attach a summary to each of the first [`SUMMARIZED_RESULTS`] results.
    async fn summarize_top(&self, results: &mut [SearchResult], query: &SearchQuery) {
        for result in results.iter_mut().take(SUMMARIZED_RESULTS) {
            let request = SummaryRequest::new(
                result.document.title.clone(),
                result.document.abstract_text.clone(),
            )
            .with_remote(query.summarize, query.summary_api_key.clone());

            let summary = match self.summarizer.summarize(&request).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(
                        pmid = %result.document.pmid,
                        summarizer = self.summarizer.name(),
                        error = %e,
                        "Summarization failed, using truncated abstract"
                    );
                    truncated_summary(&result.document.abstract_text)
                }
            };
            result.summary = Some(summary);
        }
    }
}

#[async_trait]
impl SearchEngine for SemanticSearchEngine {
    async fn search(&self, query: &SearchQuery) -> QueryResult<SearchResponse> {
        query.validate()?;

        // 1. Expand the raw query into the boolean fetch expression
        let boolean_query = self.expand(&query.query, query.use_mesh).into_string();
        info!(query = %query.query, boolean_query = %boolean_query, "Expanded query");

        // 2. Fetch candidates
        let documents: Vec<Document> = self.source.fetch(&boolean_query, query.max_results).await?;
        info!(source = self.source.name(), fetched = documents.len(), "Fetched documents");
        if documents.is_empty() {
            return Ok(SearchResponse::nothing_fetched(query.query.clone(), boolean_query));
        }

        // 3. Keep documents with an abstract, remembering their positions
        let keep: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| doc.has_abstract())
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Ok(SearchResponse {
                original_query: query.query.clone(),
                boolean_query,
                total_fetched: documents.len(),
                total_with_abstracts: Some(0),
                results: Vec::new(),
            });
        }

        // 4. Embed abstracts and the raw query
        let model = query.model_name.as_deref().unwrap_or(&self.default_model);
        let texts: Vec<String> = keep.iter().map(|&i| documents[i].abstract_text.clone()).collect();
        let (doc_vectors, query_vectors) = self.embed(model, texts, query.query.clone()).await?;
        debug!(model, vectors = doc_vectors.len(), "Embedded abstracts");

        // 5. Rank
        let index = FlatIndex::build(&doc_vectors)?;
        let hits = index
            .search(&query_vectors, query.top_k)?
            .into_iter()
            .next()
            .unwrap_or_default();

        // 6. Map local positions back to the fetched documents
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(&original) = keep.get(hit.index) else {
                warn!(index = hit.index, embedded = keep.len(), "Dropping out-of-range hit");
                continue;
            };
            results.push(SearchResult::new(documents[original].clone(), hit.score));
        }

        // 7. Summaries for the leading results
        self.summarize_top(&mut results, query).await;

        info!(
            fetched = documents.len(),
            with_abstracts = keep.len(),
            returned = results.len(),
            "Search complete"
        );
        Ok(SearchResponse {
            original_query: query.query.clone(),
            boolean_query,
            total_fetched: documents.len(),
            total_with_abstracts: Some(keep.len()),
            results,
        })
    }

    fn expand(&self, query: &str, use_mesh: bool) -> ExpandedQuery {
        self.expander.build_boolean_query(query, use_mesh)
    }
}
