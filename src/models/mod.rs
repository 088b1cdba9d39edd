//! Core data models for the PubMed semantic search system.
//!
//! This module contains the data structures shared across the pipeline:
//! documents fetched from the bibliographic source, ranked search results,
//! and the response envelope returned for one search.

use serde::{Deserialize, Serialize};

/// A single bibliographic record as delivered by a document source.
///
/// Documents are immutable once constructed. The pipeline only reads them;
/// they are discarded after the response is serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier, unique per source (the PubMed PMID)
    pub pmid: String,

    /// Article title
    pub title: String,

    /// Abstract text (may be empty)
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Canonical link to the record
    pub url: String,

    /// Journal title
    #[serde(default)]
    pub journal: Option<String>,

    /// Publication year (or the free-form MEDLINE date when no year is given)
    #[serde(default)]
    pub year: Option<String>,

    /// Author names in citation order
    #[serde(default)]
    pub authors: Option<Vec<String>>,
}

impl Document {
    /// Create a document with the required fields only.
    pub fn new(
        pmid: impl Into<String>,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            pmid: pmid.into(),
            title: title.into(),
            abstract_text: abstract_text.into(),
            url: url.into(),
            journal: None,
            year: None,
            authors: None,
        }
    }

    /// Whether the abstract carries any embeddable text.
    pub fn has_abstract(&self) -> bool {
        !self.abstract_text.trim().is_empty()
    }
}

/// One ranked document plus its similarity score.
///
/// Produced fresh per query. The `summary` field is only filled for the
/// leading results of a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The matched document
    #[serde(flatten)]
    pub document: Document,

    /// Inner-product similarity between query and abstract embeddings
    pub score: f32,

    /// Short summary of the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SearchResult {
    /// Create a new search result from a document and similarity score.
    pub fn new(document: Document, score: f32) -> Self {
        Self {
            document,
            score,
            summary: None,
        }
    }
}

/// The outcome of one search.
///
/// Always carries the original and expanded query strings along with the
/// fetch statistics, even when no results survive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    /// The query exactly as submitted
    pub original_query: String,

    /// The boolean expression sent to the document source
    pub boolean_query: String,

    /// Number of documents returned by the source
    pub total_fetched: usize,

    /// Number of fetched documents with a non-empty abstract.
    /// Absent when the source returned nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_with_abstracts: Option<usize>,

    /// Ranked results, highest score first
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    /// Response for a search where the source returned no documents.
    pub fn nothing_fetched(original_query: String, boolean_query: String) -> Self {
        Self {
            original_query,
            boolean_query,
            total_fetched: 0,
            total_with_abstracts: None,
            results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_abstract() {
        assert!(Document::new("1", "t", "body", "u").has_abstract());
        assert!(!Document::new("1", "t", "   \n\t", "u").has_abstract());
        assert!(!Document::new("1", "t", "", "u").has_abstract());
    }

    #[test]
    fn test_search_result_serializes_flat() {
        let mut doc = Document::new("42", "Title", "Body", "https://pubmed.ncbi.nlm.nih.gov/42/");
        doc.authors = Some(vec!["Ada Lovelace".to_string()]);
        let mut result = SearchResult::new(doc, 0.5);
        result.summary = Some("short".to_string());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["pmid"], "42");
        assert_eq!(value["abstract"], "Body");
        assert_eq!(value["score"], 0.5);
        assert_eq!(value["summary"], "short");
        assert_eq!(value["authors"][0], "Ada Lovelace");
        assert!(value.get("journal").unwrap().is_null());
    }

    #[test]
    fn test_summary_omitted_when_absent() {
        let result = SearchResult::new(Document::new("1", "t", "b", "u"), 0.1);
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("summary").is_none());
    }

    #[test]
    fn test_nothing_fetched_response() {
        let response = SearchResponse::nothing_fetched("q".into(), "(q)".into());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["total_fetched"], 0);
        assert_eq!(value["boolean_query"], "(q)");
        assert!(value.get("total_with_abstracts").is_none());
        assert_eq!(value["results"].as_array().unwrap().len(), 0);
    }
}
