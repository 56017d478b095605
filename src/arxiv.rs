//! arXiv sources.
//!
//! Two descriptors share this module: the arxiv.org search-results page
//! (scraped HTML, driven by [`SEARCH_PAGE_RULES`]) and the export API's Atom
//! feed (XML, read with `quick-xml`).

use crate::error::Result;
use crate::listing::{AuthorRule, IdRule, ListingParser, ListingRules};
use crate::paper::{
    normalize_whitespace, synthetic_id, Paper, NO_ABSTRACT, NO_AUTHORS, NO_TITLE, NO_URL,
};
use crate::registry::{endpoint, PaperParser, SourceDescriptor, SourceKind};
use chrono::{DateTime, Datelike};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;
use url::Url;

/// Default arxiv.org origin
pub const DEFAULT_ORIGIN: &str = "https://arxiv.org";

/// Default export API origin
pub const DEFAULT_FEED_ORIGIN: &str = "https://export.arxiv.org";

/// Page sizes accepted by the search page
const PAGE_SIZES: [usize; 4] = [25, 50, 100, 200];

/// Extraction rules for `arxiv.org/search` result pages
pub const SEARCH_PAGE_RULES: ListingRules = ListingRules {
    source: "arxiv",
    display_name: "arXiv",
    link_origin: DEFAULT_ORIGIN,
    item: "li.arxiv-result",
    title: &["p.title", ".title"],
    authors: &[
        AuthorRule::Each("p.authors a"),
        AuthorRule::Combined("p.authors"),
    ],
    abstract_text: &["span.abstract-full", "p.abstract"],
    year: &["p.is-size-7", "p.comments"],
    id: &[IdRule {
        selector: "p.list-title a",
        attr: None,
        pattern: Some(r"\d{4}\.\d{4,5}(v\d+)?"),
    }],
    link: "a",
    href_pattern: r"^(https?://arxiv\.org)?/abs/",
    abstract_noise: &["△ Less", "▽ More", "Abstract:"],
    author_prefixes: &["Authors:"],
};

fn search_url(origin: &Url, query: &str, max_results: usize) -> Result<Url> {
    let size = PAGE_SIZES
        .iter()
        .copied()
        .find(|s| *s >= max_results)
        .unwrap_or(PAGE_SIZES[PAGE_SIZES.len() - 1]);

    let mut url = endpoint(origin, "/search/")?;
    url.query_pairs_mut()
        .append_pair("query", query)
        .append_pair("searchtype", "all")
        .append_pair("abstracts", "show")
        .append_pair("size", &size.to_string());
    Ok(url)
}

/// Descriptor for the arxiv.org search page
pub fn descriptor(origin: &str) -> Result<SourceDescriptor> {
    SourceDescriptor::new(
        "arxiv",
        "arXiv",
        SourceKind::Scraped,
        origin,
        search_url,
        Box::new(ListingParser::new(SEARCH_PAGE_RULES)?),
    )
}

fn feed_url(origin: &Url, query: &str, max_results: usize) -> Result<Url> {
    let mut url = endpoint(origin, "/api/query")?;
    url.query_pairs_mut()
        .append_pair("search_query", &format!("all:{}", query))
        .append_pair("start", "0")
        .append_pair("max_results", &max_results.to_string());
    Ok(url)
}

/// Descriptor for the export API Atom feed
pub fn feed_descriptor(origin: &str) -> Result<SourceDescriptor> {
    SourceDescriptor::new(
        "arxiv_feed",
        "arXiv",
        SourceKind::Scraped,
        origin,
        feed_url,
        Box::new(AtomFeedParser),
    )
}

/// Parser for the export API's Atom feed
pub struct AtomFeedParser;

#[derive(Default)]
struct FeedEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    author_name: String,
    pdf_link: String,
    abs_link: String,
}

/// Field currently receiving text
#[derive(Clone, Copy, PartialEq)]
enum FeedField {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

impl FeedEntry {
    fn read_link(&mut self, e: &BytesStart<'_>) {
        let mut href = String::new();
        let mut title = String::new();
        for attr in e.attributes().flatten() {
            let value = attr.unescape_value().map(|v| v.to_string()).unwrap_or_default();
            match attr.key.local_name().as_ref() {
                b"href" => href = value,
                b"title" => title = value,
                _ => {}
            }
        }
        if title == "pdf" {
            self.pdf_link = href;
        } else if self.abs_link.is_empty() && href.contains("/abs/") {
            self.abs_link = href;
        }
    }

    fn into_paper(self, position: usize) -> Option<Paper> {
        let title = normalize_whitespace(&self.title);
        let id_text = self.id.trim().to_string();
        let url = [&self.pdf_link, &self.abs_link, &id_text]
            .into_iter()
            .find(|u| !u.trim().is_empty())
            .map(|u| u.trim().to_string());

        if title.is_empty() && url.is_none() {
            return None;
        }

        let title = if title.is_empty() { NO_TITLE.to_string() } else { title };
        let url = url.unwrap_or_else(|| NO_URL.to_string());
        let summary = normalize_whitespace(&self.summary);
        let authors = if self.authors.is_empty() {
            vec![NO_AUTHORS.to_string()]
        } else {
            self.authors
        };
        let year = DateTime::parse_from_rfc3339(self.published.trim())
            .map(|d| d.year())
            .ok()
            .or_else(|| self.published.trim().get(..4).and_then(|y| y.parse().ok()));
        let id = id_text
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|native| format!("arxiv:{}", native))
            .unwrap_or_else(|| synthetic_id("arxiv_feed", &url, &title, position));

        Some(Paper {
            id,
            title,
            authors,
            abstract_text: if summary.is_empty() { NO_ABSTRACT.to_string() } else { summary },
            year,
            url,
            source: "arXiv".to_string(),
            quality_tier: None,
            phrase: None,
        })
    }
}

impl PaperParser for AtomFeedParser {
    fn parse(&self, body: &str, _query: &str, max_results: usize) -> Result<Vec<Paper>> {
        let mut papers = Vec::new();
        if max_results == 0 {
            return Ok(papers);
        }

        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);

        let mut entry: Option<FeedEntry> = None;
        let mut field = FeedField::None;
        let mut position = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = e.local_name();
                    match (name.as_ref(), entry.as_mut()) {
                        (b"entry", _) => {
                            entry = Some(FeedEntry::default());
                            field = FeedField::None;
                        }
                        (b"id", Some(_)) => field = FeedField::Id,
                        (b"title", Some(_)) => field = FeedField::Title,
                        (b"summary", Some(_)) => field = FeedField::Summary,
                        (b"published", Some(_)) => field = FeedField::Published,
                        (b"name", Some(_)) => field = FeedField::AuthorName,
                        (b"author", Some(current)) => current.author_name.clear(),
                        (b"link", Some(current)) => current.read_link(&e),
                        _ => {}
                    }
                }
                Ok(Event::Empty(e)) => {
                    if let (b"link", Some(current)) = (e.local_name().as_ref(), entry.as_mut()) {
                        current.read_link(&e);
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = entry.as_mut() {
                        let text = e.unescape().map(|t| t.to_string()).unwrap_or_default();
                        match field {
                            FeedField::Id if current.id.is_empty() => current.id = text,
                            FeedField::Title => current.title.push_str(&text),
                            FeedField::Summary => current.summary.push_str(&text),
                            FeedField::Published => current.published.push_str(&text),
                            FeedField::AuthorName => current.author_name.push_str(&text),
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"entry" => {
                        if let Some(done) = entry.take() {
                            if let Some(paper) = done.into_paper(position) {
                                papers.push(paper);
                            }
                            position += 1;
                            if papers.len() >= max_results {
                                break;
                            }
                        }
                        field = FeedField::None;
                    }
                    b"author" => {
                        if let Some(current) = entry.as_mut() {
                            let name = normalize_whitespace(&current.author_name);
                            if !name.is_empty() {
                                current.authors.push(name);
                            }
                            current.author_name.clear();
                        }
                        field = FeedField::None;
                    }
                    _ => field = FeedField::None,
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    debug!(
                        position = reader.buffer_position(),
                        error = %e,
                        "Atom feed truncated at malformed markup"
                    );
                    break;
                }
                _ => {}
            }
        }

        Ok(papers)
    }
}
