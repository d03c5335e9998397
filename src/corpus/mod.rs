//! Corpus indexes
//!
//! Static, load-once metadata for every retrievable item. Two granularities
//! exist: verses (one reference, one short text, a position on the sphere)
//! and passages (a contiguous run of verses with its own title). Items are
//! addressed by dense 0-based index, the same index used by the matching
//! embedding store.

mod books;
mod passage;
mod verse;

pub use books::{book, find_book, Book, Testament, BOOK_COUNT, BOOKS};
pub use passage::{Passage, PassageIndex};
pub use verse::{Verse, VerseIndex};

use serde::{Deserialize, Serialize};

/// Which translation to show for display text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Translation {
    /// King James Version, always present
    #[default]
    Kjv,
    /// Berean Standard Bible, present when the alternate text file was loaded
    Bsb,
}

impl std::str::FromStr for Translation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kjv" => Ok(Translation::Kjv),
            "bsb" => Ok(Translation::Bsb),
            _ => Err(format!("Unknown translation: {} (expected kjv or bsb)", s)),
        }
    }
}

/// Position of a verse on the projected sphere
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Common view over verse and passage records used by ranking and display
pub trait CorpusEntry {
    /// Dense index, identical to the row in the matching embedding store
    fn id(&self) -> usize;

    fn reference(&self) -> &str;

    fn book_num(&self) -> u8;

    fn testament(&self) -> Testament;

    /// Text for the requested translation, falling back to the primary text
    fn display_text(&self, translation: Translation) -> &str;

    /// Verse indexes covered by this entry; a verse covers only itself
    fn verse_ids(&self) -> &[usize];

    fn title(&self) -> Option<&str> {
        None
    }
}

/// Pick the alternate text when requested and non-empty
pub(crate) fn select_text<'a>(
    primary: &'a str,
    alternate: Option<&'a str>,
    translation: Translation,
) -> &'a str {
    match (translation, alternate) {
        (Translation::Bsb, Some(alt)) if !alt.is_empty() => alt,
        _ => primary,
    }
}
