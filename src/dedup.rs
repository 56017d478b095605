//! Order-preserving duplicate removal.

use crate::paper::Paper;
use std::collections::HashSet;

/// Identity used for duplicate detection: the url when present, else the id
fn identity(paper: &Paper) -> String {
    if paper.has_url() {
        format!("url:{}", paper.url.trim())
    } else {
        format!("id:{}", paper.id)
    }
}

/// Drop later records that share a url (or id, for url-less records) with an
/// earlier one. The output is a subsequence of the input.
pub fn deduplicate(papers: Vec<Paper>) -> Vec<Paper> {
    let mut seen = HashSet::with_capacity(papers.len());
    papers
        .into_iter()
        .filter(|paper| seen.insert(identity(paper)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::NO_URL;

    fn paper(id: &str, url: &str, source: &str) -> Paper {
        Paper {
            id: id.to_string(),
            title: format!("Title {}", id),
            authors: vec![],
            abstract_text: String::new(),
            year: None,
            url: url.to_string(),
            source: source.to_string(),
            quality_tier: None,
            phrase: None,
        }
    }

    #[test]
    fn test_same_url_keeps_first() {
        let out = deduplicate(vec![
            paper("a", "https://x/1", "arXiv"),
            paper("b", "https://x/2", "arXiv"),
            paper("c", "https://x/1", "PubMed"),
        ]);
        let ids: Vec<_> = out.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(out[0].source, "arXiv");
    }

    #[test]
    fn test_sentinel_urls_fall_back_to_id() {
        let out = deduplicate(vec![
            paper("arxiv:#0:x", NO_URL, "arXiv"),
            paper("arxiv:#1:y", NO_URL, "arXiv"),
            paper("arxiv:#0:x", "", "arXiv"),
        ]);
        let ids: Vec<_> = out.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["arxiv:#0:x", "arxiv:#1:y"]);
    }

    #[test]
    fn test_url_and_id_namespaces_do_not_collide() {
        let out = deduplicate(vec![
            paper("https://x/1", NO_URL, "A"),
            paper("other", "https://x/1", "B"),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_empty_and_unique_inputs_unchanged() {
        assert!(deduplicate(Vec::new()).is_empty());
        let input = vec![paper("a", "https://x/1", "A"), paper("b", "https://x/2", "B")];
        assert_eq!(deduplicate(input.clone()), input);
    }
}
