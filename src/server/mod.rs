//! HTTP server module.
//!
//! Exposes the search pipeline over a small JSON API:
//!
//! - `GET /ping` liveness check
//! - `POST /search` run one search and return the ranked response
//!
//! Failures are reported as a single `{"detail": "..."}` body with a status
//! code chosen from the error kind.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::models::SearchResponse;
use crate::query::{QueryError, SearchEngine, SearchQuery, DEFAULT_MAX_RESULTS, DEFAULT_TOP_K};
use crate::DEFAULT_EMBEDDING_MODEL;

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request body could not be read as a search request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The search itself failed
    #[error(transparent)]
    Search(#[from] QueryError),

    /// The listener could not be started
    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Search(QueryError::Configuration(_))
            | ServerError::Search(QueryError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
            ServerError::Search(_) | ServerError::Initialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Request payload for `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// The raw query text
    pub query: String,

    /// Number of documents to fetch (default: 200)
    #[serde(default = "default_retmax")]
    pub retmax: usize,

    /// Number of ranked results to return (default: 10)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Embedding model identifier
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Append MeSH headings to the boolean query (default: true)
    #[serde(default = "default_true")]
    pub use_mesh: bool,

    /// Use the remote summarizer for the top results (default: false)
    #[serde(default)]
    pub use_gemini_summary: bool,

    /// Credential for the remote summarizer
    #[serde(default)]
    pub gemini_api_key: Option<String>,
}

fn default_retmax() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_model_name() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_true() -> bool {
    true
}

impl From<SearchRequest> for SearchQuery {
    fn from(request: SearchRequest) -> Self {
        Self {
            query: request.query,
            max_results: request.retmax,
            top_k: request.top_k,
            model_name: Some(request.model_name),
            use_mesh: request.use_mesh,
            summarize: request.use_gemini_summary,
            summary_api_key: request.gemini_api_key.filter(|k| !k.is_empty()),
        }
    }
}

/// Body of `GET /ping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub message: String,
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<dyn SearchEngine>,
}

impl AppState {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/search", post(search_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ping_handler() -> Json<PingResponse> {
    Json(PingResponse {
        message: "Backend is alive!".to_string(),
    })
}

async fn search_handler(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ServerResult<Json<SearchResponse>> {
    let Json(request) = payload.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    let query = SearchQuery::from(request);
    let response = state.engine.search(&query).await?;
    Ok(Json(response))
}

/// Bind `addr` and serve until Ctrl-C.
///
/// # Errors
/// Returns `ServerError::Initialization` if the address cannot be bound or
/// the server stops with an I/O error
pub async fn serve(addr: SocketAddr, state: AppState) -> ServerResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Initialization(format!("bind {}: {}", addr, e)))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Initialization(e.to_string()))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::{ExpandedQuery, TermExpander};
    use crate::models::{Document, SearchResult};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::sync::Mutex;
    use tower::ServiceExt;

    // Mock SearchEngine for testing
    struct MockEngine {
        outcome: fn(&SearchQuery) -> Result<SearchResponse, QueryError>,
        seen: Mutex<Vec<SearchQuery>>,
    }

    #[async_trait]
    impl SearchEngine for MockEngine {
        async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, QueryError> {
            self.seen.lock().unwrap().push(query.clone());
            (self.outcome)(query)
        }

        fn expand(&self, query: &str, use_mesh: bool) -> ExpandedQuery {
            TermExpander::default().build_boolean_query(query, use_mesh)
        }
    }

    fn test_app(outcome: fn(&SearchQuery) -> Result<SearchResponse, QueryError>) -> (Arc<MockEngine>, Router) {
        let engine = Arc::new(MockEngine {
            outcome,
            seen: Mutex::new(Vec::new()),
        });
        (engine.clone(), router(AppState::new(engine)))
    }

    fn one_result(query: &SearchQuery) -> Result<SearchResponse, QueryError> {
        let mut result = SearchResult::new(
            Document::new(
                "42".to_string(),
                "Title".to_string(),
                "Body".to_string(),
                "https://pubmed.ncbi.nlm.nih.gov/42/".to_string(),
            ),
            0.5,
        );
        result.summary = Some("Body...".to_string());
        Ok(SearchResponse {
            original_query: query.query.clone(),
            boolean_query: "(x)".to_string(),
            total_fetched: 1,
            total_with_abstracts: Some(1),
            results: vec![result],
        })
    }

    fn post_search(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/search")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let (_, app) = test_app(one_result);
        let response = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"message": "Backend is alive!"})
        );
    }

    #[tokio::test]
    async fn test_search_applies_defaults() {
        let (engine, app) = test_app(one_result);
        let response = app.oneshot(post_search(r#"{"query": "heart attack"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["original_query"], "heart attack");
        assert_eq!(body["total_with_abstracts"], 1);
        assert_eq!(body["results"][0]["pmid"], "42");
        assert_eq!(body["results"][0]["abstract"], "Body");
        assert_eq!(body["results"][0]["summary"], "Body...");

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen[0].max_results, 200);
        assert_eq!(seen[0].top_k, 10);
        assert!(seen[0].use_mesh);
        assert!(!seen[0].summarize);
        assert_eq!(seen[0].model_name.as_deref(), Some(DEFAULT_EMBEDDING_MODEL));
    }

    #[tokio::test]
    async fn test_search_passes_request_fields() {
        let (engine, app) = test_app(one_result);
        let body = r#"{"query": "q", "retmax": 50, "top_k": 3, "model_name": "m",
                       "use_mesh": false, "use_gemini_summary": true, "gemini_api_key": "k"}"#;
        app.oneshot(post_search(body)).await.unwrap();

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen[0].max_results, 50);
        assert_eq!(seen[0].top_k, 3);
        assert_eq!(seen[0].model_name.as_deref(), Some("m"));
        assert!(!seen[0].use_mesh);
        assert!(seen[0].summarize);
        assert_eq!(seen[0].summary_api_key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_configuration_error_is_400() {
        let (_, app) = test_app(|_| {
            Err(QueryError::Configuration(
                "NCBI contact email is not configured (set NCBI_EMAIL)".to_string(),
            ))
        });
        let response = app.oneshot(post_search(r#"{"query": "q"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("NCBI_EMAIL"));
    }

    #[tokio::test]
    async fn test_pipeline_error_is_500() {
        let (_, app) = test_app(|_| Err(QueryError::Embedding("model missing".to_string())));
        let response = app.oneshot(post_search(r#"{"query": "q"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("model missing"));
    }

    #[tokio::test]
    async fn test_missing_query_is_rejected() {
        let (engine, app) = test_app(one_result);
        let response = app.oneshot(post_search(r#"{"top_k": 3}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["detail"].is_string());
        assert!(engine.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ServerError::from(QueryError::InvalidQuery("top_k".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::from(QueryError::Source("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::from(QueryError::Index("dim".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
