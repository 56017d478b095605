//! Single-paper summaries through the language model.

use crate::error::{DiscoveryError, Result};
use crate::llm::LlmClient;
use crate::prompts::summary;
use serde::Deserialize;
use std::sync::Arc;

/// Reply used when the model answers without text
pub const NO_SUMMARY: &str = "No summary available.";

/// Reply used when the model call fails
pub const SUMMARY_FAILED: &str = "Failed to generate summary.";

/// Paper fields sent for summarization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Summarizer {
    llm: Arc<LlmClient>,
}

impl Summarizer {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Summarize one paper. A blank title is an invalid request.
    pub async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DiscoveryError::InvalidRequest("title is required".to_string()))?;

        let messages = summary::messages(title, request.abstract_text.as_deref(), request.url.as_deref());
        let reply = self.llm.complete(&messages, summary::OPTIONS).await?;

        Ok(reply
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| NO_SUMMARY.to_string()))
    }
}
