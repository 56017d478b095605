//! Source registry.
//!
//! A [`SourceDescriptor`] bundles everything needed to query one external
//! provider: how to build its query URL, which headers to send, and the
//! parser that turns its response body into [`Paper`] records. The
//! [`SourceRegistry`] is built once at startup and shared read-only.

use crate::error::{DiscoveryError, Result};
use crate::paper::Paper;
use crate::{arxiv, crossref, openalex, pubmed, semanticscholar};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

/// User agent string for scraped pages
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Whether a source is a structured API or a scraped page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Api,
    Scraped,
}

/// Turns a raw response body into normalized papers.
///
/// Implementations must return at most `max_results` records and must not
/// depend on wall-clock or random state.
pub trait PaperParser: Send + Sync {
    fn parse(&self, body: &str, query: &str, max_results: usize) -> Result<Vec<Paper>>;
}

/// Decodes JSON result items one at a time, keeping at most `max_results`.
///
/// An item that does not fit `T` is logged and skipped; the items after it
/// are still decoded.
pub fn decode_items<T: DeserializeOwned>(
    source: &str,
    items: Vec<serde_json::Value>,
    max_results: usize,
) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| match serde_json::from_value::<T>(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(source, position, error = %e, "Skipping result item");
                None
            }
        })
        .take(max_results)
        .collect()
}

/// Reads an explicit `null` as the field's default value
pub fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Builds the request URL for a query against a source's endpoint origin
pub type QueryUrlBuilder = fn(origin: &Url, query: &str, max_results: usize) -> Result<Url>;

/// One known source
pub struct SourceDescriptor {
    /// Registry key, e.g. `"arxiv"`
    pub name: &'static str,
    /// Human readable name, e.g. `"arXiv"`
    pub display_name: &'static str,
    pub kind: SourceKind,
    origin: Url,
    build_url: QueryUrlBuilder,
    parser: Box<dyn PaperParser>,
    api_key: Option<(&'static str, String)>,
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("kind", &self.kind)
            .field("origin", &self.origin.as_str())
            .finish()
    }
}

impl SourceDescriptor {
    pub fn new(
        name: &'static str,
        display_name: &'static str,
        kind: SourceKind,
        origin: &str,
        build_url: QueryUrlBuilder,
        parser: Box<dyn PaperParser>,
    ) -> Result<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| DiscoveryError::Config(format!("Invalid origin for {}: {}", name, e)))?;
        Ok(Self {
            name,
            display_name,
            kind,
            origin,
            build_url,
            parser,
            api_key: None,
        })
    }

    /// Attach an API key sent as `header` on every request
    pub fn with_api_key(mut self, header: &'static str, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty()).map(|k| (header, k));
        self
    }

    pub fn is_api(&self) -> bool {
        self.kind == SourceKind::Api
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn build_query_url(&self, query: &str, max_results: usize) -> Result<Url> {
        (self.build_url)(&self.origin, query, max_results)
    }

    /// Headers to send with every request to this source
    pub fn request_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = match self.kind {
            SourceKind::Scraped => vec![
                ("User-Agent", BROWSER_USER_AGENT.to_string()),
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
                ),
                ("Accept-Language", "en-US,en;q=0.9".to_string()),
            ],
            SourceKind::Api => vec![
                ("User-Agent", format!("paperscout/{}", env!("CARGO_PKG_VERSION"))),
                ("Accept", "application/json".to_string()),
            ],
        };
        if let Some((header, key)) = &self.api_key {
            headers.push((header, key.clone()));
        }
        headers
    }

    /// Parse a response body, failing on undecodable input
    pub fn try_parse(&self, body: &str, query: &str, max_results: usize) -> Result<Vec<Paper>> {
        let mut papers = self.parser.parse(body, query, max_results)?;
        papers.truncate(max_results);
        Ok(papers)
    }

    /// Parse a response body; undecodable input yields no papers
    pub fn parse(&self, body: &str, query: &str, max_results: usize) -> Vec<Paper> {
        match self.try_parse(body, query, max_results) {
            Ok(papers) => papers,
            Err(e) => {
                warn!(source = self.name, error = %e, "Discarding unparseable response");
                Vec::new()
            }
        }
    }
}

/// Join an endpoint path onto a source origin
pub fn endpoint(origin: &Url, path: &str) -> Result<Url> {
    origin
        .join(path.trim_start_matches('/'))
        .map_err(|e| DiscoveryError::Config(format!("Invalid endpoint path '{}': {}", path, e)))
}

/// Per-deployment registry settings
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Endpoint origin overrides keyed by source name
    pub origins: HashMap<String, String>,
    pub semantic_scholar_key: Option<String>,
}

impl RegistryOptions {
    fn origin<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.origins.get(name).map(String::as_str).unwrap_or(default)
    }
}

/// Ordered table of known sources
#[derive(Debug)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceDescriptor>) -> Self {
        Self { sources }
    }

    /// All built-in sources, in merge order
    pub fn builtin(options: &RegistryOptions) -> Result<Self> {
        let sources = vec![
            semanticscholar::descriptor(
                options.origin("semanticscholar", semanticscholar::DEFAULT_ORIGIN),
                options.semantic_scholar_key.clone(),
            )?,
            crossref::descriptor(options.origin("crossref", crossref::DEFAULT_ORIGIN))?,
            openalex::descriptor(options.origin("openalex", openalex::DEFAULT_ORIGIN))?,
            arxiv::descriptor(options.origin("arxiv", arxiv::DEFAULT_ORIGIN))?,
            arxiv::feed_descriptor(options.origin("arxiv_feed", arxiv::DEFAULT_FEED_ORIGIN))?,
            pubmed::descriptor(options.origin("pubmed", pubmed::DEFAULT_ORIGIN))?,
        ];
        info!(count = sources.len(), "Source registry initialized");
        Ok(Self::new(sources))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Sources matching `names`, in registry order.
    ///
    /// `None` or an empty list selects every source; unknown names are ignored.
    pub fn select(&self, names: Option<&[String]>) -> Vec<&SourceDescriptor> {
        match names {
            Some(names) if !names.is_empty() => {
                for unknown in names.iter().filter(|n| self.get(n).is_none()) {
                    warn!(source = %unknown, "Ignoring unknown source");
                }
                self.sources
                    .iter()
                    .filter(|s| names.iter().any(|n| s.name.eq_ignore_ascii_case(n.trim())))
                    .collect()
            }
            _ => self.sources.iter().collect(),
        }
    }
}
