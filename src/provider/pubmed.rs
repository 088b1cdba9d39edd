//! PubMed document source.
//!
//! Queries NCBI E-utilities in two steps: `esearch` resolves the boolean
//! expression to a list of PMIDs, then `efetch` retrieves the MEDLINE XML
//! records for those PMIDs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use super::medline::parse_article_set;
use super::{DocumentSource, ProviderError, ProviderResult};
use crate::models::Document;

/// Above this many PMIDs, efetch is sent as a POST form.
pub const EFETCH_POST_THRESHOLD: usize = 200;

/// Default E-utilities endpoint.
pub const DEFAULT_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Connection settings for the E-utilities API.
#[derive(Debug, Clone)]
pub struct PubMedConfig {
    /// Base URL without a trailing slash
    pub base_url: String,
    /// Contact email NCBI requires on every request
    pub email: Option<String>,
    /// Optional API key raising the rate limit
    pub api_key: Option<String>,
    /// Tool name reported to NCBI
    pub tool: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EUTILS_URL.to_string(),
            email: None,
            api_key: None,
            tool: "pubmed-semantic-search".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

/// [`DocumentSource`] backed by the NCBI E-utilities HTTP API.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: reqwest::Client,
    config: PubMedConfig,
}

impl PubMedSource {
    /// Create a new PubMed source.
    ///
    /// # Errors
    /// Returns `ProviderError::ConfigError` if the HTTP client cannot be built
    pub fn new(config: PubMedConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn contact_email(&self) -> ProviderResult<&str> {
        self.config
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                ProviderError::ConfigError(
                    "NCBI contact email is not configured (set NCBI_EMAIL)".to_string(),
                )
            })
    }

    fn common_params<'a>(&'a self, email: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![("db", "pubmed"), ("tool", self.config.tool.as_str()), ("email", email)];
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            params.push(("api_key", key));
        }
        params
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> ProviderResult<reqwest::Response> {
        let request = self.client.get(self.url(endpoint)).query(params);
        self.send(endpoint, request).await
    }

    async fn post_form(&self, endpoint: &str, params: &[(&str, &str)]) -> ProviderResult<reqwest::Response> {
        let request = self.client.post(self.url(endpoint)).form(params);
        self.send(endpoint, request).await
    }

    async fn send(&self, endpoint: &str, request: reqwest::RequestBuilder) -> ProviderResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(format!("{}: {}", endpoint, e)))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimitExceeded(format!(
                "{} returned 429",
                endpoint
            ))),
            status if !status.is_success() => Err(ProviderError::NetworkError(format!(
                "{} returned {}",
                endpoint, status
            ))),
            _ => Ok(response),
        }
    }

    async fn search_ids(&self, query: &str, max_results: usize, email: &str) -> ProviderResult<Vec<String>> {
        let retmax = max_results.to_string();
        let mut params = self.common_params(email);
        params.extend([("term", query), ("retmax", retmax.as_str()), ("retmode", "json")]);

        let body: EsearchResponse = self
            .get("esearch.fcgi", &params)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("esearch response: {}", e)))?;
        Ok(body.esearchresult.idlist)
    }

    async fn fetch_records(&self, ids: &[String], email: &str) -> ProviderResult<Vec<Document>> {
        let id_list = ids.join(",");
        let mut params = self.common_params(email);
        params.extend([("id", id_list.as_str()), ("rettype", "abstract"), ("retmode", "xml")]);

        let response = if ids.len() > EFETCH_POST_THRESHOLD {
            self.post_form("efetch.fcgi", &params).await?
        } else {
            self.get("efetch.fcgi", &params).await?
        };
        let xml = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(format!("efetch body: {}", e)))?;
        parse_article_set(&xml)
    }
}

#[async_trait]
impl DocumentSource for PubMedSource {
    async fn fetch(&self, query: &str, max_results: usize) -> ProviderResult<Vec<Document>> {
        let email = self.contact_email()?;

        let ids = self.search_ids(query, max_results, email).await?;
        debug!(count = ids.len(), "esearch returned PMIDs");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.fetch_records(&ids, email).await?;
        info!(
            requested = ids.len(),
            parsed = documents.len(),
            "Fetched PubMed records"
        );
        Ok(documents)
    }

    fn name(&self) -> &str {
        "pubmed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const EFETCH_XML: &str = r#"<PubmedArticleSet>
      <PubmedArticle><MedlineCitation><PMID>101</PMID>
        <Article><ArticleTitle>First</ArticleTitle>
          <Abstract><AbstractText>Cardiac outcomes.</AbstractText></Abstract>
        </Article></MedlineCitation></PubmedArticle>
      <PubmedArticle><MedlineCitation><PMID>102</PMID>
        <Article><ArticleTitle>Second</ArticleTitle></Article>
      </MedlineCitation></PubmedArticle>
    </PubmedArticleSet>"#;

    fn source_for(server: &mockito::ServerGuard, email: Option<&str>) -> PubMedSource {
        PubMedSource::new(PubMedConfig {
            base_url: server.url(),
            email: email.map(str::to_string),
            api_key: Some("secret".to_string()),
            ..PubMedConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_two_step() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("db".into(), "pubmed".into()),
                Matcher::UrlEncoded("term".into(), "(heart OR cardiac)".into()),
                Matcher::UrlEncoded("retmax".into(), "5".into()),
                Matcher::UrlEncoded("email".into(), "me@example.org".into()),
                Matcher::UrlEncoded("api_key".into(), "secret".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"esearchresult": {"count": "2", "idlist": ["101", "102"]}}"#)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "101,102".into()),
                Matcher::UrlEncoded("retmode".into(), "xml".into()),
            ]))
            .with_body(EFETCH_XML)
            .create_async()
            .await;

        let source = source_for(&server, Some("me@example.org"));
        let docs = source.fetch("(heart OR cardiac)", 5).await.unwrap();

        search.assert_async().await;
        fetch.assert_async().await;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].pmid, "101");
        assert_eq!(docs[0].abstract_text, "Cardiac outcomes.");
        assert_eq!(docs[1].abstract_text, "");
    }

    #[tokio::test]
    async fn test_large_id_list_posts_efetch_form() {
        let ids: Vec<String> = (1..=EFETCH_POST_THRESHOLD + 1).map(|i| i.to_string()).collect();
        let idlist = serde_json::to_string(&ids).unwrap();

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_body(format!(r#"{{"esearchresult": {{"idlist": {}}}}}"#, idlist))
            .create_async()
            .await;
        let get_fetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let post_fetch = server
            .mock("POST", "/efetch.fcgi")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), ids.join(",")),
                Matcher::UrlEncoded("email".into(), "me@example.org".into()),
                Matcher::UrlEncoded("retmode".into(), "xml".into()),
            ]))
            .with_body(EFETCH_XML)
            .create_async()
            .await;

        let docs = source_for(&server, Some("me@example.org"))
            .fetch("q", ids.len())
            .await
            .unwrap();

        post_fetch.assert_async().await;
        get_fetch.assert_async().await;
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_id_list_skips_efetch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_body(r#"{"esearchresult": {"count": "0", "idlist": []}}"#)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let docs = source_for(&server, Some("me@example.org"))
            .fetch("nothing", 10)
            .await
            .unwrap();
        assert!(docs.is_empty());
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_email_is_config_error() {
        let server = mockito::Server::new_async().await;
        let result = source_for(&server, Some("   ")).fetch("q", 1).await;
        assert!(matches!(result, Err(ProviderError::ConfigError(_))));
        let result = source_for(&server, None).fetch("q", 1).await;
        assert!(matches!(result, Err(ProviderError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_and_server_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;
        let result = source_for(&server, Some("me@example.org")).fetch("q", 1).await;
        assert!(matches!(result, Err(ProviderError::RateLimitExceeded(_))));

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;
        let result = source_for(&server, Some("me@example.org")).fetch("q", 1).await;
        assert!(matches!(result, Err(ProviderError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_unexpected_esearch_schema_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_body(r#"{"error": "bad term"}"#)
            .create_async()
            .await;
        let result = source_for(&server, Some("me@example.org")).fetch("q", 1).await;
        assert!(matches!(result, Err(ProviderError::ParseError(_))));
    }
}
