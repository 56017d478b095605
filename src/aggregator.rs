//! Concurrent fetch-and-parse across the source registry.
//!
//! Every selected source runs at the same time; the run completes when the
//! slowest source finishes or times out. Results are concatenated in registry
//! order and failures contribute nothing.

use crate::error::SourceFailure;
use crate::fetcher::Fetcher;
use crate::paper::Paper;
use crate::registry::{SourceDescriptor, SourceRegistry};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    fetcher: Fetcher,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>, fetcher: Fetcher) -> Self {
        Self { registry, fetcher }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Query every selected source for `query`.
    ///
    /// `max_results` bounds each source's contribution, not the total.
    pub async fn aggregate(
        &self,
        query: &str,
        selection: Option<&[String]>,
        max_results: usize,
    ) -> Vec<Paper> {
        let query = query.trim();
        if query.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let sources = self.registry.select(selection);
        let started = Instant::now();

        let batches = join_all(
            sources
                .iter()
                .map(|source| self.run_source(source, query, max_results)),
        )
        .await;

        let papers: Vec<Paper> = batches.into_iter().flatten().collect();
        info!(
            query = query,
            sources = sources.len(),
            count = papers.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation complete"
        );
        papers
    }

    /// Fetch and parse a single source; failures become an empty slice
    pub async fn run_source(
        &self,
        source: &SourceDescriptor,
        query: &str,
        max_results: usize,
    ) -> Vec<Paper> {
        match self.fetch_and_parse(source, query, max_results).await {
            Ok(papers) => {
                debug!(source = source.name, count = papers.len(), "Source finished");
                papers
            }
            Err(failure) => {
                warn!(source = source.name, error = %failure, "Source contributed no results");
                Vec::new()
            }
        }
    }

    async fn fetch_and_parse(
        &self,
        source: &SourceDescriptor,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Paper>, SourceFailure> {
        let raw = self.fetcher.fetch(source, query, max_results).await?;
        source
            .try_parse(&raw.body, query, max_results)
            .map_err(|e| SourceFailure::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::{registry_with, stalled_origin};
    use crate::fetcher::DEFAULT_TIMEOUT;
    use std::time::Duration;

    const ARXIV_PAGE: &str = include_str!("../tests/fixtures/arxiv_search.html");

    const CROSSREF_BODY: &str = r#"{"message": {"items": [
        {"DOI": "10.1/a", "title": ["First"], "URL": "https://doi.org/10.1/a"},
        {"DOI": "10.1/b", "title": ["Second"], "URL": "https://doi.org/10.1/b"},
        {"DOI": "10.1/c", "title": ["Third"], "URL": "https://doi.org/10.1/c"}
    ]}}"#;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_arxiv_page_bounded_by_max_results() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(ARXIV_PAGE)
            .create_async()
            .await;

        let registry = registry_with(&[("arxiv", &server.url())], None);
        let aggregator = Aggregator::new(Arc::new(registry), Fetcher::new(DEFAULT_TIMEOUT).expect("fetcher"));

        let selection = names(&["arxiv"]);
        let papers = aggregator
            .aggregate("graph neural networks", Some(selection.as_slice()), 5)
            .await;

        assert_eq!(papers.len(), 5);
        for paper in &papers {
            assert!(!paper.title.is_empty());
            assert!(paper.url.starts_with("https://arxiv.org"), "{}", paper.url);
            assert_eq!(paper.source, "arXiv");
        }
    }

    #[tokio::test]
    async fn test_timed_out_source_contributes_nothing() {
        let stalled = stalled_origin().await;
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(CROSSREF_BODY)
            .create_async()
            .await;

        let registry = registry_with(
            &[("semanticscholar", &stalled), ("crossref", &server.url())],
            None,
        );
        let aggregator = Aggregator::new(
            Arc::new(registry),
            Fetcher::new(Duration::from_millis(300)).expect("fetcher"),
        );

        let selection = names(&["semanticscholar", "crossref"]);
        let papers = aggregator.aggregate("q", Some(selection.as_slice()), 10).await;

        let titles: Vec<_> = papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn test_registry_order_and_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(CROSSREF_BODY)
            .create_async()
            .await;
        server
            .mock("GET", "/graph/v1/paper/search")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data": [{"paperId": "x1", "title": "From S2", "url": "https://s2/x1"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("<<<not html at all")
            .create_async()
            .await;

        let origin = server.url();
        let registry = registry_with(
            &[("crossref", &origin), ("semanticscholar", &origin), ("pubmed", &origin)],
            None,
        );
        let aggregator = Aggregator::new(Arc::new(registry), Fetcher::new(DEFAULT_TIMEOUT).expect("fetcher"));

        // Caller order does not matter; registry order does.
        let selection = names(&["pubmed", "crossref", "semanticscholar"]);
        let papers = aggregator.aggregate("q", Some(selection.as_slice()), 10).await;
        let titles: Vec<_> = papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["From S2", "First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn test_blank_query_skips_network() {
        let registry = registry_with(&[], None);
        let aggregator = Aggregator::new(Arc::new(registry), Fetcher::new(DEFAULT_TIMEOUT).expect("fetcher"));
        assert!(aggregator.aggregate("   ", None, 10).await.is_empty());
        assert!(aggregator.aggregate("q", None, 0).await.is_empty());
    }
}
