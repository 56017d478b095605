//! Runtime configuration and component wiring.
//!
//! [`AppConfig`] is filled from CLI flags and environment variables by the
//! binary; [`AppConfig::build`] turns it into the shared, read-only
//! [`Services`] used by both the server and the `search` command.

use crate::aggregator::Aggregator;
use crate::error::Result;
use crate::fetcher::{Fetcher, DEFAULT_TIMEOUT};
use crate::llm::{LlmClient, LlmConfig};
use crate::orchestrator::{Orchestrator, SessionContext, DEFAULT_DEBOUNCE};
use crate::phrases::PhraseExtractor;
use crate::rankings::{QualityFilter, SjrTable};
use crate::registry::{RegistryOptions, SourceRegistry};
use crate::summary::Summarizer;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default SJR table location: `<config dir>/paperscout/sjr.csv`
pub fn default_sjr_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("paperscout").join("sjr.csv"))
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub semantic_scholar_key: Option<String>,
    /// Explicit SJR table; falls back to [`default_sjr_path`], then the embedded table
    pub sjr_table: Option<PathBuf>,
    pub source_timeout: Duration,
    pub debounce: Duration,
    /// Endpoint origin overrides keyed by source name
    pub origins: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            semantic_scholar_key: None,
            sjr_table: None,
            source_timeout: DEFAULT_TIMEOUT,
            debounce: DEFAULT_DEBOUNCE,
            origins: HashMap::new(),
        }
    }
}

/// Process-wide components, built once
#[derive(Debug, Clone)]
pub struct Services {
    pub registry: Arc<SourceRegistry>,
    pub orchestrator: Orchestrator,
    pub extractor: Arc<PhraseExtractor>,
    pub summarizer: Summarizer,
    debounce: Duration,
}

impl Services {
    /// A fresh caller-owned session using the configured debounce window
    pub fn session(&self) -> SessionContext {
        SessionContext::new(self.debounce)
    }
}

impl AppConfig {
    /// Load the SJR table from the configured path, the default path, or the
    /// embedded sample, in that order
    pub fn load_sjr_table(&self) -> Result<SjrTable> {
        if let Some(path) = &self.sjr_table {
            return SjrTable::from_path(path);
        }
        match default_sjr_path().filter(|p| p.is_file()) {
            Some(path) => SjrTable::from_path(&path),
            None => {
                debug!("Using embedded SJR table");
                SjrTable::embedded()
            }
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            origins: self.origins.clone(),
            semantic_scholar_key: self.semantic_scholar_key.clone(),
        }
    }

    pub fn build(&self) -> Result<Services> {
        let registry = Arc::new(SourceRegistry::builtin(&self.registry_options())?);
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&registry),
            Fetcher::new(self.source_timeout)?,
        ));

        let llm = Arc::new(LlmClient::new(self.llm.clone())?);
        let extractor = Arc::new(PhraseExtractor::new(Arc::clone(&llm))?);
        let summarizer = Summarizer::new(llm);

        let table = self.load_sjr_table()?;
        info!(entries = table.len(), "SJR table ready");
        let quality = Arc::new(QualityFilter::new(Arc::new(table))?);

        let orchestrator = Orchestrator::new(aggregator, Arc::clone(&extractor), quality);

        Ok(Services {
            registry,
            orchestrator,
            extractor,
            summarizer,
            debounce: self.debounce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_sjr_path_wins() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "issn,quintile,score,journal\n1111-2222,Q4,0.1,Tiny Journal").expect("write");

        let config = AppConfig {
            sjr_table: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let table = config.load_sjr_table().expect("table");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let config = AppConfig {
            sjr_table: Some(PathBuf::from("/nonexistent/sjr.csv")),
            ..Default::default()
        };
        assert!(config.load_sjr_table().is_err());
    }

    #[test]
    fn test_build_services() {
        let config = AppConfig {
            semantic_scholar_key: Some("k".to_string()),
            ..Default::default()
        };
        let services = config.build().expect("services");
        assert_eq!(services.registry.len(), 6);
        assert_eq!(services.orchestrator.aggregator().registry().len(), 6);
    }

    #[test]
    fn test_session_uses_configured_debounce() {
        let config = AppConfig {
            debounce: Duration::from_millis(120),
            ..Default::default()
        };
        let services = config.build().expect("services");
        assert_eq!(services.session().debounce_window(), Duration::from_millis(120));
        assert_eq!(
            AppConfig::default().build().expect("services").session().debounce_window(),
            DEFAULT_DEBOUNCE
        );
    }
}
