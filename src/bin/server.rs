//! HTTP server binary entry point.
//!
//! Loads settings, wires the search engine and serves the JSON API until
//! interrupted.
//!
//! ```bash
//! NCBI_EMAIL=me@example.org server --port 8000
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pubmed_semantic_search::config::SettingsLoader;
use pubmed_semantic_search::server::{serve, AppState};
use pubmed_semantic_search::VERSION;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// PubMed semantic search HTTP server
#[derive(Parser, Debug)]
#[command(name = "server", version, about = "Serve the PubMed semantic search API over HTTP")]
struct Args {
    /// Settings file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Override the listen port
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Logging verbosity level
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log_level: String,
}

fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let mut loader = SettingsLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let mut settings = loader.load().context("Failed to load settings")?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    settings.validate().context("Invalid settings")?;

    if settings.ncbi.email.is_none() {
        warn!("NCBI_EMAIL is not set; searches will be rejected until it is configured");
    }

    let engine = settings
        .build_engine()
        .context("Failed to build search engine")?;
    let addr = settings
        .server
        .socket_addr()
        .context("Invalid listen address")?;

    info!(
        version = VERSION,
        model = %settings.embedding.default_model,
        "Starting PubMed semantic search server"
    );
    serve(addr, AppState::new(Arc::new(engine)))
        .await
        .context("Server stopped with an error")?;

    Ok(())
}
