//! Semantic Scholar Graph API search.
//!
//! API Details:
//! - Search endpoint: GET /graph/v1/paper/search
//! - `limit` capped at 100 per request
//! - Rate limit: 1 req/s (unauthenticated), higher with an `x-api-key`

use crate::error::Result;
use crate::paper::{synthetic_id, Paper, NO_URL, UNTITLED};
use crate::registry::{
    decode_items, endpoint, null_as_default, PaperParser, SourceDescriptor, SourceKind,
};
use serde::Deserialize;
use url::Url;

/// Semantic Scholar API origin
pub const DEFAULT_ORIGIN: &str = "https://api.semanticscholar.org";

/// Maximum `limit` accepted by the search endpoint
const MAX_LIMIT: usize = 100;

/// Fields requested for each paper
const FIELDS: &str = "title,authors,year,abstract,url,venue";

/// Display name used when a record has no venue
const DISPLAY_NAME: &str = "Semantic Scholar";

#[derive(Debug, Deserialize)]
struct SSSearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SSPaper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    url: Option<String>,
    venue: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    authors: Vec<SSAuthor>,
}

#[derive(Debug, Deserialize)]
struct SSAuthor {
    name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn to_paper(item: SSPaper, position: usize) -> Paper {
    let paper_id = non_empty(item.paper_id);
    let title = non_empty(item.title).unwrap_or_else(|| UNTITLED.to_string());
    let url = non_empty(item.url)
        .or_else(|| {
            paper_id
                .as_ref()
                .map(|id| format!("https://www.semanticscholar.org/paper/{}", id))
        })
        .unwrap_or_else(|| NO_URL.to_string());
    let id = paper_id
        .map(|id| format!("s2:{}", id))
        .unwrap_or_else(|| synthetic_id("semanticscholar", &url, &title, position));

    Paper {
        id,
        authors: item
            .authors
            .into_iter()
            .filter_map(|a| non_empty(a.name))
            .collect(),
        abstract_text: non_empty(item.abstract_text).unwrap_or_default(),
        year: item.year,
        source: non_empty(item.venue).unwrap_or_else(|| DISPLAY_NAME.to_string()),
        title,
        url,
        quality_tier: None,
        phrase: None,
    }
}

/// Parser for the `/paper/search` JSON body
pub struct SemanticScholarParser;

impl PaperParser for SemanticScholarParser {
    fn parse(&self, body: &str, _query: &str, max_results: usize) -> Result<Vec<Paper>> {
        let response: SSSearchResponse = serde_json::from_str(body)?;
        Ok(decode_items::<SSPaper>("semanticscholar", response.data, max_results)
            .into_iter()
            .enumerate()
            .map(|(position, item)| to_paper(item, position))
            .collect())
    }
}

fn search_url(origin: &Url, query: &str, max_results: usize) -> Result<Url> {
    let mut url = endpoint(origin, "/graph/v1/paper/search")?;
    url.query_pairs_mut()
        .append_pair("query", query)
        .append_pair("limit", &max_results.clamp(1, MAX_LIMIT).to_string())
        .append_pair("fields", FIELDS);
    Ok(url)
}

/// Descriptor for Semantic Scholar search; `api_key` is sent as `x-api-key`
pub fn descriptor(origin: &str, api_key: Option<String>) -> Result<SourceDescriptor> {
    Ok(SourceDescriptor::new(
        "semanticscholar",
        DISPLAY_NAME,
        SourceKind::Api,
        origin,
        search_url,
        Box::new(SemanticScholarParser),
    )?
    .with_api_key("x-api-key", api_key))
}
