//! Prompts for extracting search phrases from research text.

use crate::llm::{ChatMessage, CompletionOptions};

/// System prompt for phrase extraction
pub const SYSTEM_PROMPT: &str = r#"You are an expert research assistant. Extract the 3 most important 4-6 word phrases from the given research content that would be most effective for finding relevant academic papers. Prefer specific research topics, methodologies and terms that would appear in paper titles or abstracts.
Return ONLY a JSON array of exactly 3 phrases, ordered by importance (most important first). The phrases must be taken directly from the content, not generated. Phrases shorter than 4 words are acceptable when the content is short."#;

/// User prompt template
/// Placeholders: {content}
pub const USER_PROMPT_TEMPLATE: &str =
    "Extract the 3 most important research phrases from this content: {content} Return only the JSON array of phrases.";

/// Low temperature keeps phrases verbatim
pub const OPTIONS: CompletionOptions = CompletionOptions {
    temperature: Some(0.1),
    max_tokens: Some(300),
};

pub fn build_user_prompt(content: &str) -> String {
    USER_PROMPT_TEMPLATE.replace("{content}", content)
}

pub fn messages(content: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(content)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_user_prompt() {
        let prompt = build_user_prompt("Study of protein folding");
        assert!(prompt.contains("Study of protein folding"));
        assert!(prompt.ends_with("Return only the JSON array of phrases."));
        assert_eq!(messages("x").len(), 2);
    }
}
