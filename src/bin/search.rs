//! Search binary entry point.
//!
//! This binary provides a command-line interface to the PubMed semantic
//! search pipeline. It supports both single-query and interactive REPL modes,
//! with table or JSON output.
//!
//! # Examples
//!
//! Single query with default settings:
//! ```bash
//! search --query "heart attack"
//! ```
//!
//! JSON output without MeSH expansion:
//! ```bash
//! search --query "lung cancer screening" --no-mesh --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! search --interactive
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use pubmed_semantic_search::{
    config::SettingsLoader,
    models::{SearchResponse, SearchResult},
    query::{SearchEngine, SearchQuery, SemanticSearchEngine},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored scores
    Table,
    /// The full response as JSON
    Json,
}

/// Search binary CLI for the PubMed semantic search pipeline
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Search PubMed and rank abstracts by semantic similarity",
    long_about = "Expand a query with synonyms and MeSH headings, fetch matching PubMed \
                  abstracts, and rank them by embedding similarity to the query.

EXAMPLES:
  Single query:
    search --query \"heart attack\"

  Fetch more candidates, keep the top 20:
    search --query \"statin myopathy\" --retmax 500 --top-k 20

  Interactive mode:
    search --interactive"
)]
struct Args {
    /// Search query (required for single-query mode, omitted in interactive mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Number of documents to fetch from PubMed
    #[arg(long, value_name = "N", default_value = "200")]
    retmax: usize,

    /// Number of results to return
    #[arg(long, value_name = "N", default_value = "10")]
    top_k: usize,

    /// Embedding model identifier (defaults to the configured model)
    #[arg(long, value_name = "ID")]
    model: Option<String>,

    /// Do not append MeSH headings to the boolean query
    #[arg(long)]
    no_mesh: bool,

    /// Use the remote summarizer for the top results
    #[arg(long)]
    summarize: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// Settings file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

/// Spinner shown on stderr while a search runs
fn create_spinner(query: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed}] {msg}")
            .context("Invalid spinner template")?,
    );
    spinner.set_message(format!("Searching PubMed for \"{}\"", query));
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// Execute a search query and return the response
async fn execute_search(engine: &SemanticSearchEngine, query: &SearchQuery) -> Result<SearchResponse> {
    debug!("Executing search for query: {}", query.query);

    let spinner = create_spinner(&query.query)?;
    let outcome = engine.search(query).await;
    spinner.finish_and_clear();

    outcome.with_context(|| format!("Failed to execute search for query: '{}'", query.query))
}

/// Shorten to `max` characters, marking the cut with an ellipsis
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

fn score_color(score: f32) -> Color {
    if score >= 0.9 {
        Color::Green
    } else if score >= 0.8 {
        Color::Cyan
    } else if score >= 0.7 {
        Color::Yellow
    } else {
        Color::White
    }
}

/// Format results as a pretty table
fn format_results_table(response: &SearchResponse) -> String {
    if response.results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("PMID").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Journal").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in response.results.iter().enumerate() {
        let doc = &result.document;
        let authors = doc.authors.as_deref().unwrap_or_default().join(", ");

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&doc.pmid),
            Cell::new(truncate_chars(&doc.title, 60)),
            Cell::new(truncate_chars(&authors, 40)),
            Cell::new(truncate_chars(doc.journal.as_deref().unwrap_or("-"), 30)),
            Cell::new(doc.year.as_deref().unwrap_or("-")),
            Cell::new(format!("{:.4}", result.score)).fg(score_color(result.score)),
        ]);
    }

    table.to_string()
}

/// Format the full response as JSON
fn format_response_json(response: &SearchResponse) -> Result<String> {
    serde_json::to_string_pretty(response).with_context(|| "Failed to serialize response to JSON")
}

/// Print a response in the requested format
fn print_response(response: &SearchResponse, format: OutputFormat, elapsed: Duration) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("Boolean query: {}", response.boolean_query);
            println!("{}", format_results_table(response));
            println!(
                "\nFetched {} documents ({} with abstracts), showing {} in {:.2}s",
                response.total_fetched,
                response.total_with_abstracts.unwrap_or(0),
                response.results.len(),
                elapsed.as_secs_f64()
            );
        }
        OutputFormat::Json => println!("{}", format_response_json(response)?),
    }
    Ok(())
}

/// Display detailed view of a single result
fn display_result_detail(result: &SearchResult, rank: usize) {
    let doc = &result.document;
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("PMID: {}", doc.pmid);
    println!("Title: {}", doc.title);
    if let Some(authors) = &doc.authors {
        println!("Authors: {}", authors.join(", "));
    }
    if let Some(journal) = &doc.journal {
        println!("Journal: {}", journal);
    }
    if let Some(year) = &doc.year {
        println!("Year: {}", year);
    }
    println!("URL: {}", doc.url);
    println!("Score: {:.4}", result.score);
    if let Some(summary) = &result.summary {
        println!("\nSummary:\n{}", summary);
    }
    println!("\nAbstract:\n{}", doc.abstract_text);
    println!("{}", "═".repeat(80));
}

fn print_help() {
    println!("Commands:");
    println!("  <query>          - Search PubMed");
    println!("  /top N           - Set number of results to N");
    println!("  /retmax N        - Set number of documents fetched to N");
    println!("  /mesh on|off     - Toggle MeSH headings in the boolean query");
    println!("  /format table    - Use table output format");
    println!("  /format json     - Use JSON output format");
    println!("  /detail N        - Show full details for result rank N");
    println!("  /expand TEXT     - Show the boolean query for TEXT without searching");
    println!("  /help            - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

fn parse_positive(value: Option<&str>) -> Option<usize> {
    value.and_then(|v| v.parse::<usize>().ok()).filter(|n| *n > 0)
}

/// Run interactive REPL mode
async fn run_interactive(
    engine: SemanticSearchEngine,
    mut template: SearchQuery,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Interactive PubMed Search");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;
    let mut last_results: Vec<SearchResult> = Vec::new();

    loop {
        let line = match rl.readline("Search> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rl.add_history_entry(line).ok();

        let Some(command) = line.strip_prefix('/') else {
            let mut query = template.clone();
            query.query = line.to_string();
            let start = Instant::now();
            match execute_search(&engine, &query).await {
                Ok(response) => {
                    if let Err(e) = print_response(&response, format, start.elapsed()) {
                        eprintln!("Error formatting output: {}", e);
                    }
                    last_results = response.results;
                }
                Err(e) => eprintln!("Search failed: {:#}", e),
            }
            continue;
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(n, r)| (n, r.trim()))
            .unwrap_or((command, ""));
        let arg = Some(rest).filter(|r| !r.is_empty());

        match name {
            "help" => print_help(),
            "top" => match parse_positive(arg) {
                Some(n) => {
                    template.top_k = n;
                    println!("Set top-k to {}", n);
                }
                None => eprintln!("Usage: /top N (N must be a positive integer)"),
            },
            "retmax" => match parse_positive(arg) {
                Some(n) => {
                    template.max_results = n;
                    println!("Set retmax to {}", n);
                }
                None => eprintln!("Usage: /retmax N (N must be a positive integer)"),
            },
            "mesh" => match arg {
                Some("on") => {
                    template.use_mesh = true;
                    println!("MeSH expansion enabled");
                }
                Some("off") => {
                    template.use_mesh = false;
                    println!("MeSH expansion disabled");
                }
                _ => eprintln!("Usage: /mesh on|off"),
            },
            "format" => match arg {
                Some("table") => {
                    format = OutputFormat::Table;
                    println!("Set output format to table");
                }
                Some("json") => {
                    format = OutputFormat::Json;
                    println!("Set output format to JSON");
                }
                _ => eprintln!("Usage: /format [table|json]"),
            },
            "detail" => match parse_positive(arg) {
                Some(rank) if rank <= last_results.len() => {
                    display_result_detail(&last_results[rank - 1], rank);
                }
                Some(rank) => eprintln!(
                    "Rank {} out of range (last search had {} results)",
                    rank,
                    last_results.len()
                ),
                None => eprintln!("Usage: /detail N (N must be a positive integer)"),
            },
            "expand" => match arg {
                Some(text) => println!("{}", engine.expand(text, template.use_mesh)),
                None => eprintln!("Usage: /expand TEXT"),
            },
            _ => eprintln!("Unknown command: /{}. Type /help for available commands.", name),
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query(engine: SemanticSearchEngine, query: SearchQuery, format: OutputFormat) -> Result<()> {
    let start = Instant::now();
    let response = execute_search(&engine, &query).await?;
    print_response(&response, format, start.elapsed())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level);

    let query_text = match (&args.query, args.interactive) {
        (_, true) => String::new(),
        (Some(text), false) => text.clone(),
        (None, false) => anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        ),
    };
    if args.retmax == 0 || args.top_k == 0 {
        anyhow::bail!("--retmax and --top-k must be positive integers");
    }

    let mut loader = SettingsLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let settings = loader.load().context("Failed to load settings")?;
    if settings.ncbi.email.is_none() {
        anyhow::bail!(
            "NCBI contact email is not configured.\n\
             Set NCBI_EMAIL in the environment or .env, or [ncbi] email in the settings file."
        );
    }

    let engine = settings
        .build_engine()
        .context("Failed to build search engine")?;
    info!(model = engine.default_model(), "Search engine ready");

    let mut query = SearchQuery::new(query_text);
    query.max_results = args.retmax;
    query.top_k = args.top_k;
    query.model_name = args.model;
    query.use_mesh = !args.no_mesh;
    query.summarize = args.summarize;

    if args.interactive {
        run_interactive(engine, query, args.format).await
    } else {
        run_single_query(engine, query, args.format).await
    }
}
