//! paperscout - Multi-source academic paper discovery
//!
//! Queries structured scholarly APIs and scraped listing pages concurrently,
//! merges and deduplicates the results, and optionally filters them by SJR
//! journal tier.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! paperscout search "graph neural networks" --sources arxiv,crossref --max-results 5
//! paperscout search "$(cat notes.txt)" --extract-phrases --min-sjr Q2 --output ./output
//! ```
//!
//! ### Interactive Mode
//! ```bash
//! paperscout watch --min-sjr Q2   # one query per line; a newer line supersedes older runs
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! paperscout serve --port 3000
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use paperscout::config::{AppConfig, Services};
use paperscout::llm::{LlmConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use paperscout::orchestrator::{
    OrchestratorOptions, PhraseFallback, QueryInput, RunState, SessionContext,
};
use paperscout::paper::{Paper, TierLabel};
use paperscout::rankings::MinTier;
use paperscout::{registry::SourceRegistry, server};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Multi-source academic paper discovery - Rust Microservice
#[derive(Parser)]
#[command(name = "paperscout")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every subcommand
#[derive(Args)]
struct Settings {
    /// Chat-completion service base URL
    #[arg(long, global = true, env = "PAPERSCOUT_LLM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    llm_base_url: String,

    /// Chat-completion API key (sent as a bearer token)
    #[arg(long, global = true, env = "PAPERSCOUT_LLM_API_KEY", hide_env_values = true)]
    llm_key: Option<String>,

    /// Chat-completion model name
    #[arg(long, global = true, env = "PAPERSCOUT_LLM_MODEL", default_value = DEFAULT_MODEL)]
    llm_model: String,

    /// Semantic Scholar API key
    #[arg(long, global = true, env = "SEMANTIC_SCHOLAR_API_KEY", hide_env_values = true)]
    semantic_scholar_key: Option<String>,

    /// SJR table (CSV: issn,quintile,score,journal)
    #[arg(long, global = true, env = "PAPERSCOUT_SJR_TABLE")]
    sjr_table: Option<PathBuf>,

    /// Per-source request timeout in seconds
    #[arg(long, global = true, default_value = "10")]
    source_timeout_secs: u64,

    /// Input debounce window in milliseconds
    #[arg(long, global = true, default_value = "500")]
    debounce_ms: u64,
}

impl Settings {
    fn to_config(&self) -> AppConfig {
        AppConfig {
            llm: LlmConfig {
                base_url: self.llm_base_url.clone(),
                api_key: self.llm_key.clone(),
                model: self.llm_model.clone(),
            },
            semantic_scholar_key: self.semantic_scholar_key.clone(),
            sjr_table: self.sjr_table.clone(),
            source_timeout: Duration::from_secs(self.source_timeout_secs),
            debounce: Duration::from_millis(self.debounce_ms),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search all (or selected) sources
    Search {
        /// Query text, or free-form content with --extract-phrases
        text: String,

        /// Comma-separated source names (default: all)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Maximum results per source
        #[arg(long, default_value = "10")]
        max_results: usize,

        /// Minimum SJR quintile: Q1..Q5 or "all"
        #[arg(long, default_value = "all")]
        min_sjr: MinTier,

        /// Extract query phrases from the text with the language model
        #[arg(long)]
        extract_phrases: bool,

        /// Fall back to the raw text when phrase extraction fails
        #[arg(long, requires = "extract_phrases")]
        raw_fallback: bool,

        /// Cap the final number of papers
        #[arg(long)]
        limit: Option<usize>,

        /// Write CSV to this file (or a timestamped file in this directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read queries from stdin, one per line, debounced
    Watch {
        /// Comma-separated source names (default: all)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Maximum results per source
        #[arg(long, default_value = "10")]
        max_results: usize,

        /// Minimum SJR quintile: Q1..Q5 or "all"
        #[arg(long, default_value = "all")]
        min_sjr: MinTier,

        /// Treat each line as free text and extract phrases from it
        #[arg(long)]
        extract_phrases: bool,

        /// Cap the number of papers per report
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// List known sources
    Sources,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_json {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = cli.settings.to_config();

    match cli.command {
        Commands::Search {
            text,
            sources,
            max_results,
            min_sjr,
            extract_phrases,
            raw_fallback,
            limit,
            output,
        } => {
            let input = if extract_phrases {
                QueryInput::Text(text)
            } else {
                QueryInput::Phrases(vec![text])
            };
            let options = OrchestratorOptions {
                sources: (!sources.is_empty()).then_some(sources),
                max_results,
                min_tier: min_sjr,
                limit,
                phrase_fallback: if raw_fallback {
                    PhraseFallback::RawText
                } else {
                    PhraseFallback::Fail
                },
            };
            run_search(&config, input, options, output).await
        }
        Commands::Watch {
            sources,
            max_results,
            min_sjr,
            extract_phrases,
            limit,
        } => {
            let options = OrchestratorOptions {
                sources: (!sources.is_empty()).then_some(sources),
                max_results,
                min_tier: min_sjr,
                limit,
                phrase_fallback: PhraseFallback::RawText,
            };
            run_watch(&config, options, extract_phrases).await
        }
        Commands::Serve { port, host } => run_server(&config, host, port).await,
        Commands::Sources => list_sources(&config),
    }
}

// ============================================================================
// Search
// ============================================================================

async fn run_search(
    config: &AppConfig,
    input: QueryInput,
    options: OrchestratorOptions,
    output: Option<PathBuf>,
) -> Result<()> {
    let services = config.build().context("Failed to initialize services")?;

    let outcome = services.orchestrator.run_once(input, &options).await;
    let phrases: Vec<String> = outcome.phrases.iter().map(|p| p.text.clone()).collect();
    if outcome.state != RunState::Done {
        warn!(state = ?outcome.state, "Search did not complete");
    }
    let papers = outcome.into_result().context("Search failed")?;

    info!(phrases = ?phrases, count = papers.len(), "Search finished");

    match output {
        Some(path) => {
            let path = resolve_output_path(&path, phrases.first().map(String::as_str).unwrap_or("search"));
            save_csv(&path, &papers)?;
        }
        None => {
            let json = serde_json::to_string_pretty(&papers).context("Failed to serialize papers")?;
            println!("{}", json);
        }
    }

    Ok(())
}

/// A directory gets a timestamped file name; anything else is used as given
fn resolve_output_path(path: &Path, query: &str) -> PathBuf {
    if !path.is_dir() {
        return path.to_path_buf();
    }
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let safe_query: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .take(60)
        .collect::<String>()
        .trim()
        .replace(' ', "_");
    path.join(format!("{}_{}.csv", timestamp, safe_query))
}

/// Flat CSV row for a paper
#[derive(Serialize)]
struct PaperRow<'a> {
    id: &'a str,
    title: &'a str,
    authors: String,
    #[serde(rename = "abstract")]
    abstract_text: &'a str,
    year: Option<i32>,
    url: &'a str,
    source: &'a str,
    phrase: &'a str,
    quintile: String,
    score: Option<f64>,
    journal: &'a str,
}

impl<'a> From<&'a Paper> for PaperRow<'a> {
    fn from(p: &'a Paper) -> Self {
        let tier = p.quality_tier.as_ref();
        Self {
            id: &p.id,
            title: &p.title,
            authors: p.authors.join("; "),
            abstract_text: &p.abstract_text,
            year: p.year,
            url: &p.url,
            source: &p.source,
            phrase: p.phrase.as_deref().unwrap_or_default(),
            quintile: tier
                .map(|t| match t.quintile {
                    TierLabel::Known(q) => q.to_string(),
                    TierLabel::Unknown => "Unknown".to_string(),
                })
                .unwrap_or_default(),
            score: tier.map(|t| t.score),
            journal: tier.map(|t| t.journal.as_str()).unwrap_or_default(),
        }
    }
}

/// Save papers to a CSV file
fn save_csv(path: &Path, papers: &[Paper]) -> Result<()> {
    if papers.is_empty() {
        println!("No papers to save to {:?}", path);
        return Ok(());
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context("Failed to create CSV writer")?;

    for paper in papers {
        wtr.serialize(PaperRow::from(paper))
            .context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    println!("Saved {} papers: {:?}", papers.len(), path);
    Ok(())
}

// ============================================================================
// Watch
// ============================================================================

/// One finished run, printed as a JSON line
#[derive(Serialize)]
struct RunReport<'a> {
    query: &'a str,
    state: RunState,
    phrases: Vec<&'a str>,
    papers: &'a [Paper],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn run_watch(config: &AppConfig, options: OrchestratorOptions, extract_phrases: bool) -> Result<()> {
    let services = config.build().context("Failed to initialize services")?;
    let session = services.session();
    info!(debounce_ms = session.debounce_window().as_millis() as u64, "Watching stdin for queries");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut latest: Option<JoinHandle<()>> = None;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let query = line.trim().to_string();
        if query.is_empty() {
            continue;
        }
        let input = if extract_phrases {
            QueryInput::Text(query.clone())
        } else {
            QueryInput::Phrases(vec![query.clone()])
        };
        latest = Some(spawn_run(&services, &session, query, input, options.clone()));
    }

    if let Some(handle) = latest {
        handle.await.context("Run task panicked")?;
    }
    Ok(())
}

/// Start a debounced run; a newer ticket from `session` silences this one
fn spawn_run(
    services: &Services,
    session: &SessionContext,
    query: String,
    input: QueryInput,
    options: OrchestratorOptions,
) -> JoinHandle<()> {
    let ticket = session.begin();
    let session = session.clone();
    let orchestrator = services.orchestrator.clone();

    tokio::spawn(async move {
        let outcome = orchestrator
            .run_debounced(input, &options, &session, &ticket)
            .await;
        if outcome.state == RunState::Cancelled {
            debug!(query = %query, "Run superseded");
            return;
        }

        let report = RunReport {
            query: &query,
            state: outcome.state,
            phrases: outcome.phrases.iter().map(|p| p.text.as_str()).collect(),
            papers: &outcome.papers,
            error: outcome.error.as_ref().map(ToString::to_string),
        };
        match serde_json::to_string(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!(error = %e, "Failed to serialize run report"),
        }
    })
}

// ============================================================================
// Sources
// ============================================================================

fn list_sources(config: &AppConfig) -> Result<()> {
    let registry = SourceRegistry::builtin(&config.registry_options())
        .context("Failed to build source registry")?;
    for source in registry.iter() {
        println!(
            "{:<16} {:<18} {}",
            source.name,
            source.display_name,
            if source.is_api() { "api" } else { "scraped" }
        );
    }
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(config: &AppConfig, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let services = config.build().context("Failed to initialize services")?;

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    println!("Listening on http://{}", addr);

    server::serve(listener, services)
        .await
        .context("Server error")?;

    Ok(())
}
