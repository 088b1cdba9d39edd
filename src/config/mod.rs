//! Application settings.
//!
//! Sources are merged in this order, later ones overriding earlier ones:
//! 1. Built-in defaults ([`Settings::default`])
//! 2. A TOML file (`--config`, else `pubmed-search.toml` in the working directory)
//! 3. `PUBMED_SEARCH_` environment variables, `__` separating sections
//!    (`PUBMED_SEARCH_SERVER__PORT=9000`)
//! 4. The flat variables `NCBI_EMAIL`, `NCBI_API_KEY`, `GEMINI_API_KEY`,
//!    `GEMINI_ENDPOINT` and `GEMINI_MODEL`
//!
//! A `.env` file in the working directory is read into the process
//! environment before any of these.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::embedding::{EmbedderRegistry, OnnxModelLoader};
use crate::provider::{PubMedConfig, PubMedSource, ProviderError};
use crate::query::SemanticSearchEngine;
use crate::summary::{
    ExtractiveSummarizer, FallbackSummarizer, GeminiConfig, GeminiSummarizer, SummaryError,
};
use crate::DEFAULT_EMBEDDING_MODEL;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pubmed-search.toml";

/// Prefix of structured environment overrides.
pub const ENV_PREFIX: &str = "PUBMED_SEARCH_";

/// Flat environment variables and the setting each one fills.
pub const LEGACY_ENV: &[(&str, &str)] = &[
    ("NCBI_EMAIL", "ncbi.email"),
    ("NCBI_API_KEY", "ncbi.api_key"),
    ("GEMINI_API_KEY", "summary.api_key"),
    ("GEMINI_ENDPOINT", "summary.endpoint"),
    ("GEMINI_MODEL", "summary.model"),
];

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the settings schema
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// Values were read but are not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A component could not be constructed from the settings
    #[error("Failed to build {component}: {message}")]
    Build { component: &'static str, message: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    /// Parse `host:port` into a socket address.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if the host is not an IP address
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server address {}:{}: {}", self.host, self.port, e)))
    }
}

/// NCBI E-utilities settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NcbiSettings {
    /// Contact email; searches fail with a configuration error without it
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub base_url: String,
    pub tool: String,
    pub timeout_secs: u64,
}

impl Default for NcbiSettings {
    fn default() -> Self {
        let defaults = PubMedConfig::default();
        Self {
            email: None,
            api_key: None,
            base_url: defaults.base_url,
            tool: defaults.tool,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl NcbiSettings {
    pub fn to_pubmed_config(&self) -> PubMedConfig {
        PubMedConfig {
            base_url: self.base_url.clone(),
            email: self.email.clone(),
            api_key: self.api_key.clone(),
            tool: self.tool.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Directory holding one exported model per identifier
    pub model_root: PathBuf,
    pub default_model: String,
    /// Token limit per input; longer inputs are truncated
    pub max_length: usize,
    pub document_batch_size: usize,
    pub query_batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_root: PathBuf::from("models"),
            default_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            max_length: 512,
            document_batch_size: 8,
            query_batch_size: 1,
        }
    }
}

/// Remote summarizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub endpoint: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
}

impl Default for SummarySettings {
    fn default() -> Self {
        let defaults = GeminiConfig::default();
        Self {
            endpoint: defaults.endpoint,
            model: defaults.model,
            api_key: defaults.api_key,
            timeout_secs: defaults.timeout.as_secs(),
            max_output_tokens: defaults.max_output_tokens,
        }
    }
}

impl SummarySettings {
    pub fn to_gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            max_output_tokens: self.max_output_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// All settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub ncbi: NcbiSettings,
    pub embedding: EmbeddingSettings,
    pub summary: SummarySettings,
}

impl Settings {
    /// Check values that deserialize fine but cannot work.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first offending value
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".to_string()));
        }
        if self.embedding.document_batch_size == 0 || self.embedding.query_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding batch sizes must be at least 1".to_string(),
            ));
        }
        if self.embedding.max_length < 2 {
            return Err(ConfigError::Invalid(
                "embedding.max_length must be at least 2".to_string(),
            ));
        }
        if self.embedding.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "embedding.default_model must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Wire the search engine: PubMed source, lazily loaded ONNX embedders,
    /// and the remote summarizer backed by the extractive one.
    ///
    /// # Errors
    /// Returns `ConfigError::Build` if an HTTP client cannot be created
    pub fn build_engine(&self) -> ConfigResult<SemanticSearchEngine> {
        let source = PubMedSource::new(self.ncbi.to_pubmed_config()).map_err(|e: ProviderError| {
            ConfigError::Build {
                component: "PubMed source",
                message: e.to_string(),
            }
        })?;
        let remote = GeminiSummarizer::new(self.summary.to_gemini_config()).map_err(|e: SummaryError| {
            ConfigError::Build {
                component: "summarizer",
                message: e.to_string(),
            }
        })?;
        let summarizer = FallbackSummarizer::new(Arc::new(remote), Arc::new(ExtractiveSummarizer::new()));
        let loader = OnnxModelLoader::new(&self.embedding.model_root, self.embedding.max_length);

        Ok(SemanticSearchEngine::new(
            Arc::new(source),
            Arc::new(EmbedderRegistry::new(Arc::new(loader))),
            Arc::new(summarizer),
            self.embedding.default_model.clone(),
        )
        .with_batch_sizes(
            self.embedding.document_batch_size,
            self.embedding.query_batch_size,
        ))
    }
}

/// Settings loader.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
    legacy_env: Vec<(String, String)>,
    load_dotenv: bool,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: ENV_PREFIX.to_string(),
            legacy_env: LEGACY_ENV
                .iter()
                .map(|(var, key)| (var.to_string(), key.to_string()))
                .collect(),
            load_dotenv: true,
        }
    }

    /// Read this file instead of the default one. A missing file is an error.
    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Replace the flat variable mapping (variable name, dotted setting key).
    pub fn with_legacy_env(mut self, mapping: Vec<(String, String)>) -> Self {
        self.legacy_env = mapping;
        self
    }

    pub fn without_dotenv(mut self) -> Self {
        self.load_dotenv = false;
        self
    }

    fn figment(&self) -> ConfigResult<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        match &self.config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::Load(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                info!(path = %path.display(), "Loading configuration file");
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    info!(path = DEFAULT_CONFIG_FILE, "Loading configuration file");
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }

        figment = figment.merge(Env::prefixed(&self.env_prefix).split("__"));

        for (var, key) in &self.legacy_env {
            let key = key.clone();
            figment = figment.merge(Env::raw().only(&[var.as_str()]).map(move |_| key.clone().into()));
        }
        Ok(figment)
    }

    /// Load, merge and validate settings from all sources.
    ///
    /// # Errors
    /// Returns `ConfigError` if a source is unreadable or a value is invalid
    pub fn load(&self) -> ConfigResult<Settings> {
        if self.load_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!(path = %path.display(), "Loaded .env"),
                Err(e) if e.not_found() => {}
                Err(e) => return Err(ConfigError::Load(format!(".env: {}", e))),
            }
        }

        let settings: Settings = self.figment()?.extract()?;
        settings.validate()?;
        Ok(settings)
    }
}
