//! Verse-level corpus index

use super::{select_text, CorpusEntry, Point3, Testament, Translation};
use serde::Deserialize;

/// One verse of the corpus
#[derive(Debug, Clone, PartialEq)]
pub struct Verse {
    pub id: usize,
    pub reference: String,
    pub book_name: String,
    pub book_num: u8,
    pub testament: Testament,
    pub text: String,
    pub alternate_text: Option<String>,
    pub position: Point3,
}

impl CorpusEntry for Verse {
    fn id(&self) -> usize {
        self.id
    }

    fn reference(&self) -> &str {
        &self.reference
    }

    fn book_num(&self) -> u8 {
        self.book_num
    }

    fn testament(&self) -> Testament {
        self.testament
    }

    fn display_text(&self, translation: Translation) -> &str {
        select_text(&self.text, self.alternate_text.as_deref(), translation)
    }

    fn verse_ids(&self) -> &[usize] {
        std::slice::from_ref(&self.id)
    }
}

/// Point record as written by the sphere projection step
#[derive(Debug, Deserialize)]
struct RawPoint {
    #[serde(rename = "ref")]
    reference: String,
    text: String,
    book: String,
    book_num: u8,
    testament: Testament,
    #[serde(default)]
    sx: f32,
    #[serde(default)]
    sy: f32,
    #[serde(default)]
    sz: f32,
}

/// The verse file is either the full sphere document or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVerseFile {
    Sphere { points: Vec<RawPoint> },
    Plain(Vec<RawPoint>),
}

/// Immutable verse index, index-aligned with the verse embedding store
#[derive(Debug, Clone, Default)]
pub struct VerseIndex {
    verses: Vec<Verse>,
    has_alternates: bool,
}

impl VerseIndex {
    pub fn new(verses: Vec<Verse>) -> Self {
        let has_alternates = verses.iter().any(|v| v.alternate_text.is_some());
        Self {
            verses,
            has_alternates,
        }
    }

    /// Parse `sphere.json` (or a plain array of points)
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let points = match serde_json::from_slice::<RawVerseFile>(bytes)? {
            RawVerseFile::Sphere { points } => points,
            RawVerseFile::Plain(points) => points,
        };

        let verses = points
            .into_iter()
            .enumerate()
            .map(|(id, p)| Verse {
                id,
                reference: p.reference,
                book_name: p.book,
                book_num: p.book_num,
                testament: p.testament,
                text: p.text,
                alternate_text: None,
                position: Point3::new(p.sx, p.sy, p.sz),
            })
            .collect();

        Ok(Self::new(verses))
    }

    /// Attach alternate-translation text from `bsb_verses.json`
    ///
    /// The file is an array index-aligned with the verses; empty strings
    /// mean the translation has no text for that verse.
    pub fn attach_alternates(&mut self, bytes: &[u8]) -> Result<usize, serde_json::Error> {
        let texts: Vec<String> = serde_json::from_slice(bytes)?;
        if texts.len() != self.verses.len() {
            tracing::warn!(
                "Alternate text count {} does not match verse count {}",
                texts.len(),
                self.verses.len()
            );
        }

        let mut attached = 0;
        for (verse, text) in self.verses.iter_mut().zip(texts) {
            if !text.is_empty() {
                verse.alternate_text = Some(text);
                attached += 1;
            }
        }
        self.has_alternates = attached > 0;
        Ok(attached)
    }

    pub fn get(&self, id: usize) -> Option<&Verse> {
        self.verses.get(id)
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    pub fn has_alternates(&self) -> bool {
        self.has_alternates
    }

    pub fn iter(&self) -> impl Iterator<Item = &Verse> {
        self.verses.iter()
    }

    /// Find a verse by its exact reference string
    pub fn find_reference(&self, reference: &str) -> Option<&Verse> {
        self.verses.iter().find(|v| v.reference == reference)
    }
}
