//! Crossref works search.
//!
//! Crossref abstracts arrive as JATS XML fragments; tags are stripped before
//! the text reaches a [`Paper`].

use crate::error::{DiscoveryError, Result};
use crate::paper::{normalize_whitespace, synthetic_id, Paper, NO_URL, UNTITLED};
use crate::registry::{
    decode_items, endpoint, null_as_default, PaperParser, SourceDescriptor, SourceKind,
};
use regex::Regex;
use serde::Deserialize;
use url::Url;

/// Crossref API origin
pub const DEFAULT_ORIGIN: &str = "https://api.crossref.org";

/// Crossref caps `rows` at 1000
const MAX_ROWS: usize = 1000;

/// Display name used when an item has no container title
const DISPLAY_NAME: &str = "Crossref";

// === Crossref API Response Types ===

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Debug, Deserialize)]
struct CrossrefMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CrossrefItem {
    #[serde(rename = "DOI", default, deserialize_with = "null_as_default")]
    doi: String,
    #[serde(default, deserialize_with = "null_as_default")]
    title: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    author: Vec<CrossrefAuthor>,
    #[serde(rename = "container-title", default, deserialize_with = "null_as_default")]
    container_title: Vec<String>,
    #[serde(default)]
    published: Option<CrossrefDate>,
    #[serde(default)]
    issued: Option<CrossrefDate>,
    #[serde(rename = "URL", default)]
    url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    link: Vec<CrossrefLink>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAuthor {
    #[serde(default, deserialize_with = "null_as_default")]
    given: String,
    #[serde(default, deserialize_with = "null_as_default")]
    family: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefDate {
    #[serde(rename = "date-parts", default, deserialize_with = "null_as_default")]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CrossrefDate {
    fn year(&self) -> Option<i32> {
        self.date_parts.first().and_then(|parts| parts.first().copied().flatten())
    }
}

#[derive(Debug, Deserialize)]
struct CrossrefLink {
    #[serde(rename = "URL")]
    url: Option<String>,
}

/// Parser for the `/works` JSON body
pub struct CrossrefParser {
    tags: Regex,
}

impl CrossrefParser {
    pub fn new() -> Result<Self> {
        let tags = Regex::new(r"<[^>]+>")
            .map_err(|e| DiscoveryError::Config(format!("Invalid tag pattern: {}", e)))?;
        Ok(Self { tags })
    }

    /// Strip JATS/HTML tags from text
    fn strip_tags(&self, text: &str) -> String {
        normalize_whitespace(&self.tags.replace_all(text, " "))
    }

    fn to_paper(&self, item: CrossrefItem, position: usize) -> Paper {
        let authors = item
            .author
            .iter()
            .map(|a| match &a.name {
                Some(name) if a.given.is_empty() && a.family.is_empty() => name.trim().to_string(),
                _ => format!("{} {}", a.given, a.family).trim().to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect();

        let year = item
            .published
            .as_ref()
            .and_then(CrossrefDate::year)
            .or_else(|| item.issued.as_ref().and_then(CrossrefDate::year));

        let title = item
            .title
            .first()
            .map(|t| self.strip_tags(t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let url = item
            .url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| item.link.into_iter().find_map(|l| l.url))
            .unwrap_or_else(|| NO_URL.to_string());

        let id = if item.doi.trim().is_empty() {
            synthetic_id("crossref", &url, &title, position)
        } else {
            format!("doi:{}", item.doi.trim().to_lowercase())
        };

        Paper {
            id,
            title,
            authors,
            abstract_text: item
                .abstract_text
                .map(|s| self.strip_tags(&s))
                .unwrap_or_default(),
            year,
            url,
            source: item
                .container_title
                .into_iter()
                .map(|c| c.trim().to_string())
                .find(|c| !c.is_empty())
                .unwrap_or_else(|| DISPLAY_NAME.to_string()),
            quality_tier: None,
            phrase: None,
        }
    }
}

impl PaperParser for CrossrefParser {
    fn parse(&self, body: &str, _query: &str, max_results: usize) -> Result<Vec<Paper>> {
        let response: CrossrefResponse = serde_json::from_str(body)?;
        Ok(decode_items::<CrossrefItem>("crossref", response.message.items, max_results)
            .into_iter()
            .enumerate()
            .map(|(position, item)| self.to_paper(item, position))
            .collect())
    }
}

fn search_url(origin: &Url, query: &str, max_results: usize) -> Result<Url> {
    let mut url = endpoint(origin, "/works")?;
    url.query_pairs_mut()
        .append_pair("query", query)
        .append_pair("rows", &max_results.clamp(1, MAX_ROWS).to_string())
        .append_pair("sort", "relevance");
    Ok(url)
}

/// Descriptor for Crossref works search
pub fn descriptor(origin: &str) -> Result<SourceDescriptor> {
    SourceDescriptor::new(
        "crossref",
        DISPLAY_NAME,
        SourceKind::Api,
        origin,
        search_url,
        Box::new(CrossrefParser::new()?),
    )
}
