//! Top-level query runs.
//!
//! A run moves through
//! `Idle → ExtractingPhrases → FetchingPerPhrase → Merging → Filtering → Done`.
//! `Failed` ends a run when phrase extraction fails, and `Cancelled` ends it
//! at the next checkpoint once its [`RunTicket`] has been superseded.
//!
//! Session state (the generation counter and debounce window) belongs to the
//! caller through [`SessionContext`]; the orchestrator itself holds only
//! read-only shared components.

use crate::aggregator::Aggregator;
use crate::dedup::deduplicate;
use crate::error::{DiscoveryError, Result};
use crate::paper::{Paper, Phrase};
use crate::phrases::PhraseExtractor;
use crate::rankings::{MinTier, QualityFilter};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Inactivity window before a new run starts
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Per-source result bound used when the caller gives none
pub const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    ExtractingPhrases,
    FetchingPerPhrase,
    Merging,
    Filtering,
    Done,
    Failed,
    Cancelled,
}

/// What the user asked for
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// Free text; phrases are extracted by the language model
    Text(String),
    /// Explicit query phrases; extraction is skipped
    Phrases(Vec<String>),
}

/// What to do when phrase extraction fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhraseFallback {
    /// End the run in `Failed`
    #[default]
    Fail,
    /// Use the raw input text as the only phrase
    RawText,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Source names; `None` selects every source
    pub sources: Option<Vec<String>>,
    /// Per-source bound
    pub max_results: usize,
    pub min_tier: MinTier,
    /// Optional cap on the final list
    pub limit: Option<usize>,
    pub phrase_fallback: PhraseFallback,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            sources: None,
            max_results: DEFAULT_MAX_RESULTS,
            min_tier: MinTier::All,
            limit: None,
            phrase_fallback: PhraseFallback::Fail,
        }
    }
}

/// Caller-owned session: hands out run tickets and debounces input
#[derive(Debug, Clone)]
pub struct SessionContext {
    generation: Arc<AtomicU64>,
    debounce: Duration,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl SessionContext {
    pub fn new(debounce: Duration) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            debounce,
        }
    }

    pub fn debounce_window(&self) -> Duration {
        self.debounce
    }

    /// Start a new generation; every earlier ticket becomes stale
    pub fn begin(&self) -> RunTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RunTicket {
            generation,
            current: Arc::clone(&self.generation),
        }
    }

    /// Wait out the debounce window; true if `ticket` is still the latest
    pub async fn debounce(&self, ticket: &RunTicket) -> bool {
        tokio::time::sleep(self.debounce).await;
        ticket.is_current()
    }
}

/// Generation token for one run
#[derive(Debug, Clone)]
pub struct RunTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// Result of one run
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    /// States entered, in order, starting with `Idle`
    pub visited: Vec<RunState>,
    pub phrases: Vec<Phrase>,
    pub papers: Vec<Paper>,
    pub error: Option<DiscoveryError>,
}

impl RunOutcome {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            visited: vec![RunState::Idle],
            phrases: Vec::new(),
            papers: Vec::new(),
            error: None,
        }
    }

    fn enter(&mut self, state: RunState) {
        debug!(from = ?self.state, to = ?state, "Run state transition");
        self.state = state;
        self.visited.push(state);
    }

    /// Enter `state` unless the ticket went stale, in which case enter `Cancelled`
    fn advance(&mut self, state: RunState, ticket: &RunTicket) -> bool {
        if ticket.is_current() {
            self.enter(state);
            true
        } else {
            info!(generation = ticket.generation(), "Run superseded, discarding results");
            self.papers.clear();
            self.enter(RunState::Cancelled);
            false
        }
    }

    fn fail(mut self, error: DiscoveryError) -> Self {
        warn!(error = %error, "Run failed");
        self.error = Some(error);
        self.enter(RunState::Failed);
        self
    }

    /// Papers of a finished run; the error of a failed one
    pub fn into_result(self) -> Result<Vec<Paper>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.papers),
        }
    }
}

/// Drives phrase extraction, per-phrase aggregation, merge and filtering
#[derive(Debug, Clone)]
pub struct Orchestrator {
    aggregator: Arc<Aggregator>,
    extractor: Arc<PhraseExtractor>,
    quality: Arc<QualityFilter>,
}

impl Orchestrator {
    pub fn new(
        aggregator: Arc<Aggregator>,
        extractor: Arc<PhraseExtractor>,
        quality: Arc<QualityFilter>,
    ) -> Self {
        Self {
            aggregator,
            extractor,
            quality,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Run once outside any session
    pub async fn run_once(&self, input: QueryInput, options: &OrchestratorOptions) -> RunOutcome {
        let session = SessionContext::default();
        let ticket = session.begin();
        self.run(input, options, &ticket).await
    }

    /// Wait out the session's debounce window, then run unless `ticket` was
    /// superseded meanwhile
    pub async fn run_debounced(
        &self,
        input: QueryInput,
        options: &OrchestratorOptions,
        session: &SessionContext,
        ticket: &RunTicket,
    ) -> RunOutcome {
        if session.debounce(ticket).await {
            return self.run(input, options, ticket).await;
        }
        debug!(generation = ticket.generation(), "Superseded during debounce");
        let mut outcome = RunOutcome::new();
        outcome.enter(RunState::Cancelled);
        outcome
    }

    pub async fn run(
        &self,
        input: QueryInput,
        options: &OrchestratorOptions,
        ticket: &RunTicket,
    ) -> RunOutcome {
        let mut outcome = RunOutcome::new();

        let phrases = match input {
            QueryInput::Phrases(list) => list
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(Phrase::unlocated)
                .collect(),
            QueryInput::Text(text) => {
                if !outcome.advance(RunState::ExtractingPhrases, ticket) {
                    return outcome;
                }
                match self.extractor.extract(&text).await {
                    Ok(phrases) => phrases,
                    Err(e) if options.phrase_fallback == PhraseFallback::RawText && !text.trim().is_empty() => {
                        warn!(error = %e, "Phrase extraction failed, using raw text");
                        vec![Phrase::locate(text.trim(), &text)]
                    }
                    Err(e) => return outcome.fail(e),
                }
            }
        };
        outcome.phrases = phrases;

        if !outcome.advance(RunState::FetchingPerPhrase, ticket) {
            return outcome;
        }
        let selection = options.sources.as_deref();
        let batches = join_all(outcome.phrases.iter().map(|phrase| {
            self.aggregator
                .aggregate(&phrase.text, selection, options.max_results)
        }))
        .await;

        if !outcome.advance(RunState::Merging, ticket) {
            return outcome;
        }
        let merged: Vec<Paper> = outcome
            .phrases
            .iter()
            .zip(batches)
            .flat_map(|(phrase, papers)| {
                papers.into_iter().map(move |mut paper| {
                    paper.phrase = Some(phrase.text.clone());
                    paper
                })
            })
            .collect();
        let total = merged.len();
        let unique = deduplicate(merged);

        if !outcome.advance(RunState::Filtering, ticket) {
            return outcome;
        }
        let mut papers = self.quality.apply(unique, options.min_tier);
        if let Some(limit) = options.limit {
            papers.truncate(limit);
        }

        outcome.papers = papers;
        if !outcome.advance(RunState::Done, ticket) {
            return outcome;
        }

        info!(
            phrases = outcome.phrases.len(),
            merged = total,
            returned = outcome.papers.len(),
            "Query run complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::registry_with;
    use crate::fetcher::{Fetcher, DEFAULT_TIMEOUT};
    use crate::llm::tests::{client_for, completion_body};
    use crate::paper::{Quintile, TierLabel};
    use crate::rankings::SjrTable;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    const ALPHA: &str = r#"{"message": {"items": [
        {"DOI": "10.1/a", "title": ["Paper A"], "URL": "https://doi.org/10.1/a"},
        {"DOI": "10.1/b", "title": ["Paper B"], "URL": "https://journal.example/1424-8220/b"}
    ]}}"#;

    const BETA: &str = r#"{"message": {"items": [
        {"DOI": "10.1/b", "title": ["Paper B"], "URL": "https://journal.example/1424-8220/b"},
        {"DOI": "10.1/c", "title": ["Paper C"], "URL": "https://doi.org/10.1/c"}
    ]}}"#;

    async fn crossref_server() -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        for (query, body) in [("alpha", ALPHA), ("beta", BETA)] {
            server
                .mock("GET", "/works")
                .match_query(mockito::Matcher::UrlEncoded("query".into(), query.into()))
                .with_status(200)
                .with_body(body)
                .create_async()
                .await;
        }
        server
    }

    /// Origin that answers a single request with `body` once `release` fires;
    /// `arrived` fires as soon as the request has been read
    async fn gated_origin(body: &'static str) -> (String, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (arrived_tx, arrived_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = arrived_tx.send(());
            let _ = release_rx.await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        (format!("http://{}", addr), arrived_rx, release_tx)
    }

    fn orchestrator(sources: &mockito::Server, llm: &mockito::Server) -> Orchestrator {
        orchestrator_at(&sources.url(), llm)
    }

    fn orchestrator_at(crossref_origin: &str, llm: &mockito::Server) -> Orchestrator {
        let registry = registry_with(&[("crossref", crossref_origin)], None);
        let aggregator = Aggregator::new(Arc::new(registry), Fetcher::new(DEFAULT_TIMEOUT).expect("fetcher"));
        let extractor = PhraseExtractor::new(Arc::new(client_for(llm))).expect("extractor");
        let quality = QualityFilter::new(Arc::new(SjrTable::embedded().expect("table"))).expect("filter");
        Orchestrator::new(Arc::new(aggregator), Arc::new(extractor), Arc::new(quality))
    }

    fn crossref_only() -> OrchestratorOptions {
        OrchestratorOptions {
            sources: Some(vec!["crossref".to_string()]),
            ..Default::default()
        }
    }

    fn titles(papers: &[Paper]) -> Vec<&str> {
        papers.iter().map(|p| p.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_explicit_phrases_merge_in_phrase_order() {
        let sources = crossref_server().await;
        let llm = mockito::Server::new_async().await;
        let orch = orchestrator(&sources, &llm);

        let outcome = orch
            .run_once(
                QueryInput::Phrases(vec!["alpha".to_string(), " ".to_string(), "beta".to_string()]),
                &crossref_only(),
            )
            .await;

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(
            outcome.visited,
            vec![
                RunState::Idle,
                RunState::FetchingPerPhrase,
                RunState::Merging,
                RunState::Filtering,
                RunState::Done
            ]
        );
        assert_eq!(titles(&outcome.papers), vec!["Paper A", "Paper B", "Paper C"]);
        assert_eq!(outcome.papers[1].phrase.as_deref(), Some("alpha"));
        assert_eq!(outcome.papers[2].phrase.as_deref(), Some("beta"));
        assert!(outcome.papers.iter().all(|p| p.quality_tier.is_none()));
    }

    #[tokio::test]
    async fn test_text_input_extracts_phrases() {
        let sources = crossref_server().await;
        let mut llm = mockito::Server::new_async().await;
        llm.mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion_body("<think>hmm</think>[\"beta\"]"))
            .create_async()
            .await;
        let orch = orchestrator(&sources, &llm);

        let outcome = orch
            .run_once(QueryInput::Text("notes about beta decay".to_string()), &crossref_only())
            .await;

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.visited[1], RunState::ExtractingPhrases);
        assert_eq!(outcome.phrases, vec![Phrase::locate("beta", "notes about beta decay")]);
        assert_eq!(outcome.phrases[0].start_offset, 12);
        assert_eq!(titles(&outcome.papers), vec!["Paper B", "Paper C"]);
    }

    #[tokio::test]
    async fn test_extraction_failure_policy() {
        let sources = crossref_server().await;
        let mut llm = mockito::Server::new_async().await;
        llm.mock("POST", "/chat/completions")
            .with_status(500)
            .create_async()
            .await;
        let orch = orchestrator(&sources, &llm);

        let failed = orch
            .run_once(QueryInput::Text("alpha".to_string()), &crossref_only())
            .await;
        assert_eq!(failed.state, RunState::Failed);
        assert!(failed.papers.is_empty());
        assert!(matches!(failed.into_result(), Err(DiscoveryError::UpstreamService(_))));

        let options = OrchestratorOptions {
            phrase_fallback: PhraseFallback::RawText,
            ..crossref_only()
        };
        let recovered = orch.run_once(QueryInput::Text(" alpha ".to_string()), &options).await;
        assert_eq!(recovered.state, RunState::Done);
        assert_eq!(titles(&recovered.papers), vec!["Paper A", "Paper B"]);
        assert_eq!(recovered.phrases[0].start_offset, 1);
    }

    #[tokio::test]
    async fn test_quality_threshold_and_limit() {
        let sources = crossref_server().await;
        let llm = mockito::Server::new_async().await;
        let orch = orchestrator(&sources, &llm);
        let phrases = || QueryInput::Phrases(vec!["alpha".to_string(), "beta".to_string()]);

        let strict = OrchestratorOptions {
            min_tier: MinTier::AtLeast(Quintile::Q1),
            ..crossref_only()
        };
        let outcome = orch.run_once(phrases(), &strict).await;
        assert_eq!(titles(&outcome.papers), vec!["Paper A", "Paper C"]);
        assert!(outcome
            .papers
            .iter()
            .all(|p| p.quality_tier.as_ref().map(|t| t.quintile) == Some(TierLabel::Unknown)));

        let loose = OrchestratorOptions {
            min_tier: MinTier::AtLeast(Quintile::Q2),
            limit: Some(2),
            ..crossref_only()
        };
        let outcome = orch.run_once(phrases(), &loose).await;
        assert_eq!(titles(&outcome.papers), vec!["Paper A", "Paper B"]);
        let tier = outcome.papers[1].quality_tier.as_ref().expect("tier");
        assert_eq!(tier.quintile, TierLabel::Known(Quintile::Q2));
    }

    #[tokio::test]
    async fn test_stale_ticket_is_cancelled() {
        let sources = crossref_server().await;
        let llm = mockito::Server::new_async().await;
        let orch = orchestrator(&sources, &llm);

        let session = SessionContext::new(Duration::from_millis(10));
        let stale = session.begin();
        let fresh = session.begin();

        let outcome = orch
            .run(QueryInput::Phrases(vec!["alpha".to_string()]), &crossref_only(), &stale)
            .await;
        assert_eq!(outcome.state, RunState::Cancelled);
        assert_eq!(outcome.visited, vec![RunState::Idle, RunState::Cancelled]);
        assert!(outcome.papers.is_empty());

        let outcome = orch
            .run(QueryInput::Phrases(vec!["alpha".to_string()]), &crossref_only(), &fresh)
            .await;
        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.papers.len(), 2);
    }

    #[tokio::test]
    async fn test_run_superseded_mid_fetch_discards_results() {
        let (origin, arrived, release) = gated_origin(ALPHA).await;
        let llm = mockito::Server::new_async().await;
        let orch = orchestrator_at(&origin, &llm);

        let session = SessionContext::new(Duration::from_millis(10));
        let ticket = session.begin();
        let in_flight = {
            let orch = orch.clone();
            let ticket = ticket.clone();
            tokio::spawn(async move {
                orch.run(QueryInput::Phrases(vec!["alpha".to_string()]), &crossref_only(), &ticket)
                    .await
            })
        };

        arrived.await.expect("request reached the source");
        let newer = session.begin();
        release.send(()).expect("release response");

        let outcome = in_flight.await.expect("join");
        assert_eq!(outcome.state, RunState::Cancelled);
        assert!(outcome.papers.is_empty());
        assert_eq!(
            outcome.visited,
            vec![RunState::Idle, RunState::FetchingPerPhrase, RunState::Cancelled]
        );
        assert!(newer.is_current());
        assert!(!ticket.is_current());
    }

    #[tokio::test]
    async fn test_run_debounced_only_latest_input_runs() {
        let sources = crossref_server().await;
        let llm = mockito::Server::new_async().await;
        let orch = orchestrator(&sources, &llm);
        let session = SessionContext::new(Duration::from_millis(50));

        let first = session.begin();
        let pending = {
            let (orch, session, first) = (orch.clone(), session.clone(), first.clone());
            tokio::spawn(async move {
                orch.run_debounced(
                    QueryInput::Phrases(vec!["alpha".to_string()]),
                    &crossref_only(),
                    &session,
                    &first,
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = session.begin();

        let superseded = pending.await.expect("join");
        assert_eq!(superseded.visited, vec![RunState::Idle, RunState::Cancelled]);

        let latest = orch
            .run_debounced(
                QueryInput::Phrases(vec!["beta".to_string()]),
                &crossref_only(),
                &session,
                &second,
            )
            .await;
        assert_eq!(latest.state, RunState::Done);
        assert_eq!(titles(&latest.papers), vec!["Paper B", "Paper C"]);
    }

    #[tokio::test]
    async fn test_debounce_supersedes_earlier_ticket() {
        let session = SessionContext::new(Duration::from_millis(50));
        let first = session.begin();

        let waiting = {
            let session = session.clone();
            let first = first.clone();
            tokio::spawn(async move { session.debounce(&first).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = session.begin();

        assert!(!waiting.await.expect("join"));
        assert!(session.debounce(&second).await);
        assert_eq!(second.generation(), first.generation() + 1);
    }
}
