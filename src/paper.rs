//! The normalized paper record and its quality annotation.
//!
//! Every source parser produces [`Paper`] values; nothing downstream of the
//! parsers ever sees a source-specific field name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Title used by scraped sources when no title is found
pub const NO_TITLE: &str = "No title";
/// Author entry used by scraped sources when no authors are found
pub const NO_AUTHORS: &str = "No authors";
/// Abstract used by scraped sources when no abstract is found
pub const NO_ABSTRACT: &str = "No abstract";
/// Title used by structured APIs when the record has no title
pub const UNTITLED: &str = "Untitled";
/// URL used when no link could be located
pub const NO_URL: &str = "#";

/// A single discovered paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub year: Option<i32>,
    pub url: String,
    /// Display name of the originating source, or the venue for API records
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quality_tier: Option<QualityTier>,
    /// Query phrase that produced this paper
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phrase: Option<String>,
}

impl Paper {
    /// True when the url is a real link rather than the `"#"` sentinel
    pub fn has_url(&self) -> bool {
        let url = self.url.trim();
        !url.is_empty() && url != NO_URL
    }
}

/// Build a deterministic id for records without a native identifier.
///
/// `position` is the element's index within its page and only matters when
/// the url is the sentinel.
pub fn synthetic_id(source: &str, url: &str, title: &str, position: usize) -> String {
    if !url.is_empty() && url != NO_URL {
        return format!("{}:{}", source, url);
    }
    let slug: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .take(8)
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    format!("{}:#{}:{}", source, position, slug)
}

/// Collapse runs of whitespace and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SJR-style journal quintile, Q1 being the highest tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quintile {
    Q1 = 1,
    Q2 = 2,
    Q3 = 3,
    Q4 = 4,
    Q5 = 5,
}

impl Quintile {
    /// Parse `"Q1"`..`"Q5"` (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "Q1" => Some(Quintile::Q1),
            "Q2" => Some(Quintile::Q2),
            "Q3" => Some(Quintile::Q3),
            "Q4" => Some(Quintile::Q4),
            "Q5" => Some(Quintile::Q5),
            _ => None,
        }
    }

    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Quintile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.rank())
    }
}

/// Quintile as reported on a paper: known tier or `"Unknown"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierLabel {
    Known(Quintile),
    Unknown,
}

impl Serialize for TierLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TierLabel::Known(q) => serializer.collect_str(q),
            TierLabel::Unknown => serializer.serialize_str("Unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for TierLabel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Quintile::parse(&raw)
            .map(TierLabel::Known)
            .unwrap_or(TierLabel::Unknown))
    }
}

/// Quality annotation attached by the quality filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTier {
    pub quintile: TierLabel,
    pub score: f64,
    pub journal: String,
}

impl QualityTier {
    pub fn unknown() -> Self {
        Self {
            quintile: TierLabel::Unknown,
            score: 0.0,
            journal: "Unknown".to_string(),
        }
    }
}

/// A query phrase located inside the user's input text.
///
/// Offsets are character offsets; `start_offset` is 0 when the phrase does
/// not occur verbatim in the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phrase {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Phrase {
    /// Locate `text` in `input` and record its character span
    pub fn locate(text: &str, input: &str) -> Self {
        let len = text.chars().count();
        match input.find(text) {
            Some(byte_idx) => {
                let start = input[..byte_idx].chars().count();
                Self {
                    text: text.to_string(),
                    start_offset: start,
                    end_offset: start + len,
                }
            }
            None => Self::unlocated(text),
        }
    }

    /// A phrase with no source text, spanning `0..len`
    pub fn unlocated(text: &str) -> Self {
        Self {
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.chars().count(),
        }
    }
}
