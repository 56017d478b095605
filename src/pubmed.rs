//! PubMed search-results page.

use crate::error::Result;
use crate::listing::{AuthorRule, IdRule, ListingParser, ListingRules};
use crate::registry::{endpoint, SourceDescriptor, SourceKind};
use url::Url;

/// Default PubMed origin
pub const DEFAULT_ORIGIN: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// Page sizes accepted by the results page
const PAGE_SIZES: [usize; 5] = [10, 20, 50, 100, 200];

/// Extraction rules for PubMed result pages.
///
/// PubMed renders authors as one pre-formatted string, kept as a single author.
pub const SEARCH_PAGE_RULES: ListingRules = ListingRules {
    source: "pubmed",
    display_name: "PubMed",
    link_origin: DEFAULT_ORIGIN,
    item: "article.full-docsum",
    title: &["a.docsum-title", ".docsum-title"],
    authors: &[
        AuthorRule::Combined("span.full-authors"),
        AuthorRule::Combined("span.docsum-authors"),
    ],
    abstract_text: &["div.full-view-snippet", "div.short-view-snippet"],
    year: &["span.full-journal-citation", "span.docsum-journal-citation"],
    id: &[IdRule {
        selector: "a.docsum-title",
        attr: Some("data-article-id"),
        pattern: Some(r"^\d+$"),
    }],
    link: "a",
    href_pattern: r"^(https?://pubmed\.ncbi\.nlm\.nih\.gov)?/\d+/?$",
    abstract_noise: &[],
    author_prefixes: &[],
};

fn search_url(origin: &Url, query: &str, max_results: usize) -> Result<Url> {
    let size = PAGE_SIZES
        .iter()
        .copied()
        .find(|s| *s >= max_results)
        .unwrap_or(PAGE_SIZES[PAGE_SIZES.len() - 1]);

    let mut url = endpoint(origin, "/")?;
    url.query_pairs_mut()
        .append_pair("term", query)
        .append_pair("size", &size.to_string());
    Ok(url)
}

/// Descriptor for the PubMed results page
pub fn descriptor(origin: &str) -> Result<SourceDescriptor> {
    SourceDescriptor::new(
        "pubmed",
        "PubMed",
        SourceKind::Scraped,
        origin,
        search_url,
        Box::new(ListingParser::new(SEARCH_PAGE_RULES)?),
    )
}
