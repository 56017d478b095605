//! Prompts for one-paper summaries.

use crate::llm::{ChatMessage, CompletionOptions};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes papers.";

/// Service defaults
pub const OPTIONS: CompletionOptions = CompletionOptions {
    temperature: None,
    max_tokens: None,
};

/// Build the user prompt; abstract and url lines are omitted when blank
pub fn build_user_prompt(title: &str, abstract_text: Option<&str>, url: Option<&str>) -> String {
    let mut prompt = format!("Summarize the following paper:\nTitle: {}\n", title);
    if let Some(abstract_text) = abstract_text.filter(|a| !a.trim().is_empty()) {
        prompt.push_str(&format!("Abstract: {}\n", abstract_text));
    }
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        prompt.push_str(&format!("URL: {}\n", url));
    }
    prompt.push_str("Don't include your thinking.");
    prompt
}

pub fn messages(title: &str, abstract_text: Option<&str>, url: Option<&str>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(title, abstract_text, url)),
    ]
}
