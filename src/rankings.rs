//! SJR journal rankings and the quality filter.
//!
//! The table maps ISSNs to a quintile, score and journal name. It is loaded
//! once at startup and only read afterwards.

use crate::error::{DiscoveryError, Result};
use crate::paper::{Paper, QualityTier, Quintile, TierLabel};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sample table compiled into the binary
const EMBEDDED_TABLE: &str = include_str!("../data/sjr.csv");

/// One row of the SJR table
#[derive(Debug, Clone, PartialEq)]
pub struct SjrEntry {
    pub issn: String,
    pub quintile: Quintile,
    pub score: f64,
    pub journal_name: String,
}

#[derive(Debug, Deserialize)]
struct SjrRecord {
    issn: String,
    quintile: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    journal: String,
}

/// Normalize an ISSN to `NNNN-NNNC` with an upper-case check character
pub fn normalize_issn(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase();
    let valid = compact.len() == 8
        && compact[..7].chars().all(|c| c.is_ascii_digit())
        && compact[7..].chars().all(|c| c.is_ascii_digit() || c == 'X');
    valid.then(|| format!("{}-{}", &compact[..4], &compact[4..]))
}

/// ISSN-keyed SJR lookup table
#[derive(Debug, Default)]
pub struct SjrTable {
    entries: HashMap<String, SjrEntry>,
}

impl SjrTable {
    /// Read a CSV table with header `issn,quintile,score,journal`
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = HashMap::new();
        for (line, record) in rdr.deserialize::<SjrRecord>().enumerate() {
            let record = record?;
            let Some(issn) = normalize_issn(&record.issn) else {
                warn!(line = line + 2, issn = %record.issn, "Skipping SJR row with invalid ISSN");
                continue;
            };
            let Some(quintile) = Quintile::parse(&record.quintile) else {
                warn!(line = line + 2, quintile = %record.quintile, "Skipping SJR row with invalid quintile");
                continue;
            };
            entries.insert(
                issn.clone(),
                SjrEntry {
                    issn,
                    quintile,
                    score: record.score.unwrap_or(0.0),
                    journal_name: record.journal,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(path = %path.display(), entries = table.len(), "Loaded SJR table");
        Ok(table)
    }

    /// The sample table shipped with the crate
    pub fn embedded() -> Result<Self> {
        Self::from_reader(EMBEDDED_TABLE.as_bytes())
    }

    pub fn lookup(&self, issn: &str) -> Option<&SjrEntry> {
        normalize_issn(issn).and_then(|key| self.entries.get(&key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Requested minimum tier (`minSJR`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinTier {
    /// No filtering
    #[default]
    All,
    /// Keep papers whose known quintile is at or above this tier
    AtLeast(Quintile),
}

impl MinTier {
    /// Parse `"all"` or `"Q1".."Q5"`; blank means all, anything else means Q1
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            return MinTier::All;
        }
        MinTier::AtLeast(Quintile::parse(value).unwrap_or(Quintile::Q1))
    }
}

impl std::str::FromStr for MinTier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Annotates papers with a quality tier and drops known sub-threshold ones
#[derive(Debug)]
pub struct QualityFilter {
    table: Arc<SjrTable>,
    issn: Regex,
}

impl QualityFilter {
    pub fn new(table: Arc<SjrTable>) -> Result<Self> {
        let issn = Regex::new(r"\b\d{4}-\d{3}[\dXx]\b")
            .map_err(|e| DiscoveryError::Config(format!("Invalid ISSN pattern: {}", e)))?;
        Ok(Self { table, issn })
    }

    pub fn table(&self) -> &SjrTable {
        &self.table
    }

    /// First ISSN found in the url, then in abstract + title
    pub fn extract_issn(&self, paper: &Paper) -> Option<String> {
        self.issn
            .find(&paper.url)
            .map(|m| m.as_str().to_string())
            .or_else(|| {
                let text = format!("{} {}", paper.abstract_text, paper.title);
                self.issn.find(&text).map(|m| m.as_str().to_string())
            })
    }

    /// Tier for a paper; `Unknown` when no ISSN resolves
    pub fn classify(&self, paper: &Paper) -> QualityTier {
        match self
            .extract_issn(paper)
            .and_then(|issn| self.table.lookup(&issn))
        {
            Some(entry) => QualityTier {
                quintile: TierLabel::Known(entry.quintile),
                score: entry.score,
                journal: entry.journal_name.clone(),
            },
            None => QualityTier::unknown(),
        }
    }

    /// Tag and filter `papers`. `MinTier::All` returns the input untouched.
    pub fn apply(&self, papers: Vec<Paper>, min: MinTier) -> Vec<Paper> {
        let MinTier::AtLeast(min) = min else {
            return papers;
        };

        let before = papers.len();
        let kept: Vec<Paper> = papers
            .into_iter()
            .filter_map(|mut paper| {
                let tier = self.classify(&paper);
                let below = matches!(tier.quintile, TierLabel::Known(q) if q > min);
                paper.quality_tier = Some(tier);
                if below {
                    debug!(id = %paper.id, "Excluded below quality threshold");
                    None
                } else {
                    Some(paper)
                }
            })
            .collect();

        debug!(min = %min, before = before, after = kept.len(), "Quality filter applied");
        kept
    }
}
