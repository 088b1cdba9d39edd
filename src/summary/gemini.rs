//! Remote summarizer backed by a Gemini-style text generation endpoint.
//!
//! The service is called as `POST {endpoint}/{model}:generate` with a bearer
//! token. Only `candidates[0].content` is accepted as the answer; any other
//! response shape is rejected.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SummaryError, SummaryRequest, SummaryResult, Summarizer};

/// Settings for [`GeminiSummarizer`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Base URL of the generation API; remote calls are skipped when unset
    pub endpoint: Option<String>,
    pub model: String,
    /// Fallback key used when a request carries none
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "gemini-1.5".to_string(),
            api_key: None,
            max_output_tokens: 350,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: Prompt<'a>,
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Prompt<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: String,
}

/// Builds the instruction sent to the model.
pub fn build_prompt(title: &str, body: &str) -> String {
    format!(
        "Summarize the following PubMed article for a researcher in 3 short bullet points \
         (at most 25 words each), then give a 1-line key takeaway. Keep the language concise \
         and technical where appropriate.\n\nArticle:\n{}\n\n{}",
        title, body
    )
}

/// Summarizer calling a remote generative model.
#[derive(Debug, Clone)]
pub struct GeminiSummarizer {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiSummarizer {
    /// Create a new remote summarizer.
    ///
    /// # Errors
    /// Returns `SummaryError::Network` if the HTTP client cannot be built
    pub fn new(config: GeminiConfig) -> SummaryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SummaryError::Network(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn credentials<'a>(&'a self, request: &'a SummaryRequest) -> SummaryResult<(&'a str, &'a str)> {
        let key = request
            .api_key
            .as_deref()
            .or(self.config.api_key.as_deref())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SummaryError::MissingCredential("no API key".to_string()))?;
        let endpoint = self
            .config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| SummaryError::MissingCredential("no endpoint configured".to_string()))?;
        Ok((key, endpoint))
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> SummaryResult<String> {
        if !request.allow_remote {
            return Err(SummaryError::Disabled);
        }
        let (key, endpoint) = self.credentials(request)?;
        let url = format!("{}/{}:generate", endpoint.trim_end_matches('/'), self.config.model);

        let prompt = build_prompt(&request.title, &request.body);
        let payload = GenerateRequest {
            prompt: Prompt { text: &prompt },
            temperature: 0.0,
            max_output_tokens: self.config.max_output_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SummaryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SummaryError::Network(format!("generate returned {}", status)));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::UnexpectedResponse(e.to_string()))?;
        let content = body
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SummaryError::UnexpectedResponse("no candidate content".to_string()))?;

        debug!(model = %self.config.model, chars = content.len(), "Remote summary received");
        Ok(content)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
