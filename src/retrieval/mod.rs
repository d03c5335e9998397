//! Ranking, filtering & result materialization
//!
//! A query vector is scored against every item of one quantized store, the
//! best candidates are kept, the book filter is applied in rank order, and
//! the survivors are turned into display entries with sphere highlights.

mod filter;
mod materialize;
mod ranking;

pub use filter::{FilterSet, TestamentState};
pub use materialize::{
    aim, Aim, Highlight, ResultEntry, ResultMaterializer, SearchResults, DEFAULT_DISPLAY_LIMIT,
};
pub use ranking::{RankingEngine, DEFAULT_CANDIDATE_WINDOW};

use serde::{Deserialize, Serialize};

/// Granularity searched by a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Verses,
    Passages,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Verses => f.write_str("verses"),
            SearchMode::Passages => f.write_str("passages"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verse" | "verses" => Ok(SearchMode::Verses),
            "passage" | "passages" => Ok(SearchMode::Passages),
            _ => Err(format!(
                "Unknown search mode: {} (expected verses or passages)",
                s
            )),
        }
    }
}

/// One scored store item
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedMatch {
    /// Row in the store, same as the corpus index
    pub index: usize,
    pub score: f32,
}

impl RankedMatch {
    pub fn new(index: usize, score: f32) -> Self {
        Self { index, score }
    }
}

/// Why a search could not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Unavailable {
    /// No query encoder has been installed yet
    EncoderNotReady,
    /// The search assets could not be loaded
    AssetsFailed { message: String, retryable: bool },
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::EncoderNotReady => f.write_str("Search model not ready"),
            Unavailable::AssetsFailed { message, retryable } => {
                write!(f, "Search assets failed to load: {}", message)?;
                if *retryable {
                    f.write_str(" (retry possible)")?;
                }
                Ok(())
            }
        }
    }
}

/// Result of one search request
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// At least one entry survived filtering
    Ranked(SearchResults),
    /// Every candidate was filtered out
    NoResults,
    /// The query was blank; nothing was encoded
    Empty,
    Unavailable(Unavailable),
    /// A newer search started before this one finished
    Superseded,
}

impl SearchOutcome {
    pub fn results(&self) -> Option<&SearchResults> {
        match self {
            SearchOutcome::Ranked(results) => Some(results),
            _ => None,
        }
    }

    pub fn into_results(self) -> Option<SearchResults> {
        match self {
            SearchOutcome::Ranked(results) => Some(results),
            _ => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, SearchOutcome::Superseded)
    }
}
