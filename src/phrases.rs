//! Query phrase extraction through the language model.
//!
//! The model is asked for a JSON array of phrases. Replies are cleaned of
//! `<think>` blocks, parsed directly, and failing that the first bracketed
//! span is parsed instead.

use crate::error::{DiscoveryError, Result};
use crate::llm::LlmClient;
use crate::paper::Phrase;
use crate::prompts::phrase_extraction;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on phrases returned
pub const MAX_PHRASES: usize = 3;

#[derive(Debug)]
pub struct PhraseExtractor {
    llm: Arc<LlmClient>,
    reasoning: Regex,
    bracketed: Regex,
}

impl PhraseExtractor {
    pub fn new(llm: Arc<LlmClient>) -> Result<Self> {
        let reasoning = Regex::new(r"(?s)<think>.*?</think>")
            .map_err(|e| DiscoveryError::Config(format!("Invalid reasoning pattern: {}", e)))?;
        let bracketed = Regex::new(r"(?s)\[.*\]")
            .map_err(|e| DiscoveryError::Config(format!("Invalid array pattern: {}", e)))?;
        Ok(Self {
            llm,
            reasoning,
            bracketed,
        })
    }

    /// Extract up to three phrases from `content`, located within it
    pub async fn extract(&self, content: &str) -> Result<Vec<Phrase>> {
        if content.trim().is_empty() {
            return Err(DiscoveryError::InvalidRequest("content is required".to_string()));
        }

        let reply = self
            .llm
            .complete(&phrase_extraction::messages(content), phrase_extraction::OPTIONS)
            .await?
            .ok_or_else(|| DiscoveryError::UpstreamService("Model reply had no content".to_string()))?;

        let texts = self.parse_reply(&reply)?;
        info!(count = texts.len(), "Extracted query phrases");

        Ok(texts.iter().map(|text| Phrase::locate(text, content)).collect())
    }

    /// Parse a raw model reply into phrase strings
    pub fn parse_reply(&self, raw: &str) -> Result<Vec<String>> {
        let cleaned = self.reasoning.replace_all(raw, "");
        let cleaned = cleaned.trim();

        let values: Vec<serde_json::Value> = match serde_json::from_str(cleaned) {
            Ok(values) => values,
            Err(direct) => {
                debug!(error = %direct, "Reply is not a bare JSON array, searching for one");
                let span = self.bracketed.find(cleaned).ok_or_else(|| {
                    let preview: String = cleaned.chars().take(200).collect();
                    DiscoveryError::UpstreamService(format!(
                        "Could not parse model reply as a JSON array: {}",
                        preview
                    ))
                })?;
                serde_json::from_str(span.as_str()).map_err(|e| {
                    DiscoveryError::UpstreamService(format!("Could not parse model reply as a JSON array: {}", e))
                })?
            }
        };

        let phrases: Vec<String> = values
            .into_iter()
            .take(MAX_PHRASES)
            .filter_map(|value| match value {
                serde_json::Value::String(s) => Some(s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect();

        if phrases.is_empty() {
            return Err(DiscoveryError::UpstreamService("Model returned no phrases".to_string()));
        }
        Ok(phrases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::{client_for, completion_body};

    fn extractor_for(server: &mockito::Server) -> PhraseExtractor {
        PhraseExtractor::new(Arc::new(client_for(server))).expect("extractor")
    }

    fn offline() -> PhraseExtractor {
        let llm = LlmClient::new(Default::default()).expect("client");
        PhraseExtractor::new(Arc::new(llm)).expect("extractor")
    }

    #[test]
    fn test_parse_bare_array() {
        let phrases = offline()
            .parse_reply(r#"["graph neural networks", "message passing layers"]"#)
            .expect("parse");
        assert_eq!(phrases, vec!["graph neural networks", "message passing layers"]);
    }

    #[test]
    fn test_parse_strips_reasoning() {
        let raw = "<think>the user wants\nthree phrases [maybe]</think>\n[\"phrase one two three four\"]";
        let phrases = offline().parse_reply(raw).expect("parse");
        assert_eq!(phrases, vec!["phrase one two three four"]);
    }

    #[test]
    fn test_parse_embedded_array() {
        let raw = "Here are the phrases:\n```json\n[\"a b c d\", \"e f g h\"]\n```";
        let phrases = offline().parse_reply(raw).expect("parse");
        assert_eq!(phrases, vec!["a b c d", "e f g h"]);
    }

    #[test]
    fn test_parse_filters_and_caps() {
        let raw = r#"["one", "", 7, "four", "five"]"#;
        assert_eq!(offline().parse_reply(raw).expect("parse"), vec!["one"]);

        let raw = r#"["one", "two", "three", "four"]"#;
        assert_eq!(offline().parse_reply(raw).expect("parse").len(), MAX_PHRASES);
    }

    #[test]
    fn test_parse_failures_are_upstream_errors() {
        for raw in ["no array here", "[not json]", "[]", "<think>only thoughts</think>"] {
            let err = offline().parse_reply(raw).expect_err(raw);
            assert!(matches!(err, DiscoveryError::UpstreamService(_)), "{}", raw);
        }
    }

    #[tokio::test]
    async fn test_extract_locates_phrases() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "temperature": 0.1,
                "max_tokens": 300
            })))
            .with_status(200)
            .with_body(completion_body(r#"["protein folding", "missing phrase"]"#))
            .create_async()
            .await;

        let content = "A study of protein folding dynamics";
        let phrases = extractor_for(&server).extract(content).await.expect("extract");
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].text, "protein folding");
        assert_eq!(phrases[0].start_offset, 11);
        assert_eq!(phrases[0].end_offset, 26);
        assert_eq!(phrases[1].start_offset, 0);
    }

    #[tokio::test]
    async fn test_extract_blank_content_is_invalid() {
        let err = offline().extract("   ").await.expect_err("blank");
        assert!(matches!(err, DiscoveryError::InvalidRequest(_)));
    }
}
