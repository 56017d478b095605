//! # paperscout
//!
//! Multi-source academic paper discovery - Rust Microservice
//!
//! ## Modules
//!
//! - [`registry`] - Known sources and the parser capability
//! - [`fetcher`] / [`aggregator`] - Concurrent, failure-isolated source queries
//! - [`semanticscholar`], [`crossref`], [`openalex`] - Structured API parsers
//! - [`arxiv`], [`pubmed`], [`listing`] - Scraped page and feed parsers
//! - [`dedup`] / [`rankings`] - Duplicate removal and SJR quality filtering
//! - [`phrases`] / [`summary`] - Language-model collaborators
//! - [`orchestrator`] - Query runs from text to filtered papers
//! - [`server`] - HTTP interface
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use paperscout::config::AppConfig;
//! use paperscout::orchestrator::{OrchestratorOptions, QueryInput};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let services = AppConfig::default().build()?;
//!     let outcome = services
//!         .orchestrator
//!         .run_once(
//!             QueryInput::Phrases(vec!["graph neural networks".to_string()]),
//!             &OrchestratorOptions::default(),
//!         )
//!         .await;
//!     println!("Found {} papers", outcome.into_result()?.len());
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod arxiv;
pub mod config;
pub mod crossref;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod listing;
pub mod llm;
pub mod openalex;
pub mod orchestrator;
pub mod paper;
pub mod phrases;
pub mod prompts;
pub mod pubmed;
pub mod rankings;
pub mod registry;
pub mod semanticscholar;
pub mod server;
pub mod summary;

pub use error::{DiscoveryError, Result};
pub use paper::Paper;
