//! OpenAlex works search.
//!
//! OpenAlex ships abstracts as an inverted index (word -> positions) for
//! licensing reasons; the plaintext is rebuilt here.

use crate::error::Result;
use crate::paper::{synthetic_id, Paper, NO_URL, UNTITLED};
use crate::registry::{
    decode_items, endpoint, null_as_default, PaperParser, SourceDescriptor, SourceKind,
};
use serde::Deserialize;
use url::Url;

/// OpenAlex API origin
pub const DEFAULT_ORIGIN: &str = "https://api.openalex.org";

/// Maximum results per page (OpenAlex limit)
const MAX_PER_PAGE: usize = 200;

/// Display name used when a work has no primary source
const DISPLAY_NAME: &str = "OpenAlex";

#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    id: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    #[serde(rename = "abstract_inverted_index")]
    abstract_index: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    authorships: Vec<OpenAlexAuthorship>,
    primary_location: Option<OpenAlexLocation>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexLocation {
    source: Option<OpenAlexSource>,
    landing_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexSource {
    display_name: Option<String>,
}

/// Reconstruct abstract text from an inverted index
fn reconstruct_abstract(inverted_index: &serde_json::Value) -> String {
    let Some(obj) = inverted_index.as_object() else {
        return String::new();
    };

    let mut words: Vec<(i64, &str)> = obj
        .iter()
        .filter_map(|(word, positions)| positions.as_array().map(|p| (word, p)))
        .flat_map(|(word, positions)| {
            positions
                .iter()
                .filter_map(|p| p.as_i64())
                .map(move |p| (p, word.as_str()))
        })
        .collect();

    words.sort_by_key(|(pos, _)| *pos);
    words.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn to_paper(work: OpenAlexWork, position: usize) -> Paper {
    let title = non_empty(work.display_name)
        .or_else(|| non_empty(work.title))
        .unwrap_or_else(|| UNTITLED.to_string());

    let (landing, venue) = match work.primary_location {
        Some(location) => (
            non_empty(location.landing_page_url),
            location.source.and_then(|s| non_empty(s.display_name)),
        ),
        None => (None, None),
    };

    let doi = non_empty(work.doi);
    let openalex_id = non_empty(work.id);
    let url = landing
        .or_else(|| doi.clone())
        .or_else(|| openalex_id.clone())
        .unwrap_or_else(|| NO_URL.to_string());

    let id = match (&doi, &openalex_id) {
        (Some(doi), _) => format!("doi:{}", doi.replace("https://doi.org/", "").to_lowercase()),
        (None, Some(oa)) => format!("openalex:{}", oa.rsplit('/').next().unwrap_or(oa)),
        (None, None) => synthetic_id("openalex", &url, &title, position),
    };

    Paper {
        id,
        authors: work
            .authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|a| non_empty(a.display_name)))
            .collect(),
        abstract_text: work
            .abstract_index
            .as_ref()
            .map(reconstruct_abstract)
            .unwrap_or_default(),
        year: work.publication_year,
        source: venue.unwrap_or_else(|| DISPLAY_NAME.to_string()),
        title,
        url,
        quality_tier: None,
        phrase: None,
    }
}

/// Parser for the `/works` JSON body
pub struct OpenAlexParser;

impl PaperParser for OpenAlexParser {
    fn parse(&self, body: &str, _query: &str, max_results: usize) -> Result<Vec<Paper>> {
        let response: OpenAlexResponse = serde_json::from_str(body)?;
        Ok(decode_items::<OpenAlexWork>("openalex", response.results, max_results)
            .into_iter()
            .enumerate()
            .map(|(position, work)| to_paper(work, position))
            .collect())
    }
}

fn search_url(origin: &Url, query: &str, max_results: usize) -> Result<Url> {
    let mut url = endpoint(origin, "/works")?;
    url.query_pairs_mut()
        .append_pair("search", query)
        .append_pair("per-page", &max_results.clamp(1, MAX_PER_PAGE).to_string())
        .append_pair(
            "select",
            "id,title,display_name,publication_year,doi,abstract_inverted_index,authorships,primary_location",
        );
    Ok(url)
}

/// Descriptor for OpenAlex works search
pub fn descriptor(origin: &str) -> Result<SourceDescriptor> {
    SourceDescriptor::new(
        "openalex",
        DISPLAY_NAME,
        SourceKind::Api,
        origin,
        search_url,
        Box::new(OpenAlexParser),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "meta": {"count": 2, "per_page": 25, "page": 1},
        "results": [
            {
                "id": "https://openalex.org/W2919115771",
                "display_name": "Graph Attention Networks",
                "publication_year": 2018,
                "doi": "https://doi.org/10.48550/arXiv.1710.10903",
                "abstract_inverted_index": {"We": [0], "present": [1], "graph": [2], "attention": [3], "networks": [4]},
                "authorships": [{"author": {"display_name": "Petar Veličković"}}, {"author": null}],
                "primary_location": {
                    "landing_page_url": "https://arxiv.org/abs/1710.10903",
                    "source": {"display_name": "arXiv (Cornell University)", "issn_l": null}
                }
            },
            {
                "id": "https://openalex.org/W1",
                "title": null,
                "display_name": null,
                "authorships": [],
                "primary_location": null
            }
        ]
    }"#;

    #[test]
    fn test_reconstruct_abstract() {
        let index = serde_json::json!({"world": [1], "Hello": [0], "again": [3], "hello": [2]});
        assert_eq!(reconstruct_abstract(&index), "Hello world hello again");
        assert_eq!(reconstruct_abstract(&serde_json::Value::Null), "");
    }

    #[test]
    fn test_parse_works() {
        let papers = OpenAlexParser.parse(RESPONSE, "q", 10).expect("parse");
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.title, "Graph Attention Networks");
        assert_eq!(first.id, "doi:10.48550/arxiv.1710.10903");
        assert_eq!(first.url, "https://arxiv.org/abs/1710.10903");
        assert_eq!(first.abstract_text, "We present graph attention networks");
        assert_eq!(first.authors, vec!["Petar Veličković".to_string()]);
        assert_eq!(first.source, "arXiv (Cornell University)");

        let sparse = &papers[1];
        assert_eq!(sparse.title, "Untitled");
        assert_eq!(sparse.id, "openalex:W1");
        assert_eq!(sparse.url, "https://openalex.org/W1");
        assert_eq!(sparse.source, "OpenAlex");
    }

    #[test]
    fn test_bad_work_is_skipped() {
        let body = r#"{"results": [
            {"id": "https://openalex.org/W10", "display_name": "Kept first", "authorships": null},
            {"id": "https://openalex.org/W11", "publication_year": "2019"},
            {"id": "https://openalex.org/W12", "display_name": "Kept last"}
        ]}"#;
        let papers = descriptor(DEFAULT_ORIGIN).expect("descriptor").parse(body, "q", 10);
        let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["openalex:W10", "openalex:W12"]);
        assert!(papers[0].authors.is_empty());
    }

    #[test]
    fn test_truncation_and_malformed() {
        assert_eq!(OpenAlexParser.parse(RESPONSE, "q", 1).expect("parse").len(), 1);
        assert!(OpenAlexParser.parse("oops", "q", 1).is_err());
    }
}
