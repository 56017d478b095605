//! Data-driven parser for scraped result listings.
//!
//! Each scraped source is described by a [`ListingRules`] table: a selector
//! for the repeated result element, then an ordered list of candidate
//! selectors per field. The first candidate producing non-empty text wins.
//! Markup changes on a target site are edits to that table, not to code.

use crate::error::{DiscoveryError, Result};
use crate::paper::{
    normalize_whitespace, synthetic_id, Paper, NO_ABSTRACT, NO_AUTHORS, NO_TITLE, NO_URL,
};
use crate::registry::PaperParser;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// How authors are read from a result element
#[derive(Debug, Clone, Copy)]
pub enum AuthorRule {
    /// One author per matched element
    Each(&'static str),
    /// A single element holding the whole author list, kept as one author
    Combined(&'static str),
}

/// Where to find a native identifier
#[derive(Debug, Clone, Copy)]
pub struct IdRule {
    pub selector: &'static str,
    /// Attribute to read; element text when `None`
    pub attr: Option<&'static str>,
    /// Regex applied to the raw value; whole match is kept
    pub pattern: Option<&'static str>,
}

/// Extraction rules for one scraped listing
#[derive(Debug, Clone, Copy)]
pub struct ListingRules {
    /// Registry name, used as the id prefix
    pub source: &'static str,
    /// Value written to `Paper::source`
    pub display_name: &'static str,
    /// Origin used to resolve relative hrefs
    pub link_origin: &'static str,
    pub item: &'static str,
    pub title: &'static [&'static str],
    pub authors: &'static [AuthorRule],
    pub abstract_text: &'static [&'static str],
    /// Elements whose text contains the publication year
    pub year: &'static [&'static str],
    pub id: &'static [IdRule],
    /// Anchors considered for the detail link
    pub link: &'static str,
    /// Regex an anchor's href must match to count as the detail link
    pub href_pattern: &'static str,
    /// Text fragments removed from extracted abstracts
    pub abstract_noise: &'static [&'static str],
    /// Prefixes stripped from extracted author text
    pub author_prefixes: &'static [&'static str],
}

struct CompiledId {
    selector: Selector,
    attr: Option<&'static str>,
    pattern: Option<Regex>,
}

enum CompiledAuthors {
    Each(Selector),
    Combined(Selector),
}

/// A [`PaperParser`] driven by [`ListingRules`]
pub struct ListingParser {
    rules: ListingRules,
    origin: Url,
    item: Selector,
    title: Vec<Selector>,
    authors: Vec<CompiledAuthors>,
    abstract_text: Vec<Selector>,
    year: Vec<Selector>,
    id: Vec<CompiledId>,
    link: Selector,
    href_pattern: Regex,
    year_regex: Regex,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| DiscoveryError::Config(format!("Invalid selector '{}': {}", css, e)))
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| DiscoveryError::Config(format!("Invalid pattern '{}': {}", pattern, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

impl ListingParser {
    /// Compile the rules; invalid selectors or patterns are a config error
    pub fn new(rules: ListingRules) -> Result<Self> {
        let origin = Url::parse(rules.link_origin)
            .map_err(|e| DiscoveryError::Config(format!("Invalid link origin: {}", e)))?;

        let authors = rules
            .authors
            .iter()
            .map(|rule| match rule {
                AuthorRule::Each(css) => selector(css).map(CompiledAuthors::Each),
                AuthorRule::Combined(css) => selector(css).map(CompiledAuthors::Combined),
            })
            .collect::<Result<Vec<_>>>()?;

        let id = rules
            .id
            .iter()
            .map(|rule| {
                Ok(CompiledId {
                    selector: selector(rule.selector)?,
                    attr: rule.attr,
                    pattern: rule.pattern.map(regex).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            origin,
            item: selector(rules.item)?,
            title: rules.title.iter().map(|c| selector(c)).collect::<Result<_>>()?,
            authors,
            abstract_text: rules.abstract_text.iter().map(|c| selector(c)).collect::<Result<_>>()?,
            year: rules.year.iter().map(|c| selector(c)).collect::<Result<_>>()?,
            id,
            link: selector(rules.link)?,
            href_pattern: regex(rules.href_pattern)?,
            year_regex: regex(r"\b(19|20)\d{2}\b")?,
            rules,
        })
    }

    /// First candidate whose first match has non-empty text
    fn first_text(&self, item: ElementRef<'_>, candidates: &[Selector]) -> Option<String> {
        candidates.iter().find_map(|sel| {
            item.select(sel)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
    }

    fn extract_authors(&self, item: ElementRef<'_>) -> Vec<String> {
        for rule in &self.authors {
            let found: Vec<String> = match rule {
                CompiledAuthors::Each(sel) => item
                    .select(sel)
                    .map(element_text)
                    .map(|name| self.strip_author_prefix(name))
                    .filter(|name| !name.is_empty())
                    .collect(),
                CompiledAuthors::Combined(sel) => item
                    .select(sel)
                    .map(element_text)
                    .map(|names| self.strip_author_prefix(names))
                    .find(|names| !names.is_empty())
                    .into_iter()
                    .collect(),
            };
            if !found.is_empty() {
                return found;
            }
        }
        vec![NO_AUTHORS.to_string()]
    }

    fn strip_author_prefix(&self, text: String) -> String {
        self.rules
            .author_prefixes
            .iter()
            .find_map(|prefix| text.strip_prefix(prefix))
            .map(|rest| rest.trim().trim_end_matches(',').trim().to_string())
            .unwrap_or(text)
    }

    fn extract_abstract(&self, item: ElementRef<'_>) -> Option<String> {
        let mut text = self.first_text(item, &self.abstract_text)?;
        for noise in self.rules.abstract_noise {
            text = text.replace(noise, "");
        }
        let text = normalize_whitespace(&text);
        (!text.is_empty()).then_some(text)
    }

    fn extract_year(&self, item: ElementRef<'_>) -> Option<i32> {
        self.year.iter().find_map(|sel| {
            item.select(sel).find_map(|el| {
                let text = element_text(el);
                self.year_regex
                    .find(&text)
                    .and_then(|m| m.as_str().parse::<i32>().ok())
            })
        })
    }

    fn extract_id(&self, item: ElementRef<'_>) -> Option<String> {
        self.id.iter().find_map(|rule| {
            item.select(&rule.selector).find_map(|el| {
                let raw = match rule.attr {
                    Some(attr) => el.value().attr(attr)?.trim().to_string(),
                    None => element_text(el),
                };
                let value = match &rule.pattern {
                    Some(re) => re.find(&raw)?.as_str().to_string(),
                    None => raw,
                };
                (!value.is_empty()).then(|| format!("{}:{}", self.rules.source, value))
            })
        })
    }

    /// First anchor whose href matches the detail pattern, made absolute
    fn extract_link(&self, item: ElementRef<'_>) -> Option<String> {
        item.select(&self.link).find_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            if !self.href_pattern.is_match(href) {
                return None;
            }
            match self.origin.join(href) {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    debug!(source = self.rules.source, href, error = %e, "Unresolvable href");
                    None
                }
            }
        })
    }

    fn parse_item(&self, item: ElementRef<'_>, position: usize) -> Result<Paper> {
        let title = self.first_text(item, &self.title);
        let url = self.extract_link(item);

        // Neither a title nor a detail link: not a usable result element
        if title.is_none() && url.is_none() {
            return Err(DiscoveryError::Parse(format!(
                "result element {} has no title and no link",
                position
            )));
        }

        let title = title.unwrap_or_else(|| NO_TITLE.to_string());
        let url = url.unwrap_or_else(|| NO_URL.to_string());
        let id = self
            .extract_id(item)
            .unwrap_or_else(|| synthetic_id(self.rules.source, &url, &title, position));

        Ok(Paper {
            id,
            authors: self.extract_authors(item),
            abstract_text: self
                .extract_abstract(item)
                .unwrap_or_else(|| NO_ABSTRACT.to_string()),
            year: self.extract_year(item),
            title,
            url,
            source: self.rules.display_name.to_string(),
            quality_tier: None,
            phrase: None,
        })
    }
}

impl PaperParser for ListingParser {
    fn parse(&self, body: &str, _query: &str, max_results: usize) -> Result<Vec<Paper>> {
        if max_results == 0 || body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document = Html::parse_document(body);
        let mut papers = Vec::new();

        for (position, item) in document.select(&self.item).enumerate() {
            if papers.len() >= max_results {
                break;
            }
            match self.parse_item(item, position) {
                Ok(paper) => papers.push(paper),
                Err(e) => {
                    debug!(source = self.rules.source, position, error = %e, "Skipping result element");
                }
            }
        }

        debug!(source = self.rules.source, count = papers.len(), "Parsed listing");
        Ok(papers)
    }
}
