//! PubMed Semantic Search - semantic ranking of PubMed abstracts.
//!
//! This library combines lexical query expansion with dense-vector ranking.
//! A natural-language query is widened into a boolean PubMed expression,
//! the matching abstracts are fetched and embedded with a biomedical
//! transformer, and the abstracts are ranked by cosine similarity to the
//! embedded query.
//!
//! # Architecture
//!
//! - **models**: Core data structures (Document, SearchResult, SearchResponse)
//! - **expansion**: Synonym/MeSH expansion and boolean query building
//! - **embedding**: Token encoders, mean pooling, normalization, model registry
//! - **index**: Exact inner-product vector index
//! - **provider**: Document sources (PubMed E-utilities)
//! - **summary**: Summarizers for the top results
//! - **query**: The retrieval pipeline
//! - **config**: Settings loading and engine wiring
//! - **server**: HTTP API
//!
//! # Workflow
//!
//! 1. Expand the query into `(term OR synonym) AND ... AND ("Heading"[MeSH Terms])`
//! 2. Fetch up to `retmax` documents for the expression
//! 3. Drop documents without an abstract
//! 4. Embed abstracts and the raw query, L2-normalized
//! 5. Rank abstracts by inner product and keep the top `k`
//! 6. Summarize the first five results
//!
//! # Example
//!
//! ```ignore
//! use pubmed_semantic_search::config::SettingsLoader;
//! use pubmed_semantic_search::query::{SearchEngine, SearchQuery};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SettingsLoader::new().load()?;
//!     let engine = settings.build_engine()?;
//!
//!     let response = engine.search(&SearchQuery::new("heart attack")).await?;
//!     println!("{}", response.boolean_query);
//!     for result in response.results {
//!         println!("{}: {}", result.document.title, result.score);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embedding;
pub mod expansion;
pub mod index;
pub mod models;
pub mod provider;
pub mod query;
pub mod server;
pub mod summary;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Embedding model used when a request names none.
pub const DEFAULT_EMBEDDING_MODEL: &str = "microsoft/BiomedNLP-PubMedBERT-base-uncased-abstract";

pub use models::{Document, SearchResponse, SearchResult};
pub use query::{SearchEngine, SearchQuery, SemanticSearchEngine};
