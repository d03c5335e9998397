//! Passage-level corpus index (pericopes)

use super::{select_text, CorpusEntry, Testament, Translation};
use serde::{Deserialize, Serialize};

/// A contiguous run of verses retrievable as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    #[serde(default)]
    pub id: usize,
    pub title: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "book")]
    pub book_name: String,
    pub book_num: u8,
    pub testament: Testament,
    pub chapter: u32,
    pub start_verse: u32,
    pub end_verse: u32,
    /// Verse indexes spanned by this passage, in reading order
    pub verse_ids: Vec<usize>,
    pub text: String,
    #[serde(
        rename = "text_bsb",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub alternate_text: Option<String>,
}

impl CorpusEntry for Passage {
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
        &self.verse_ids
    }

    fn title(&self) -> Option<&str> {
        Some(&self.title)
    }
}

/// Immutable passage index, index-aligned with the passage embedding store
#[derive(Debug, Clone, Default)]
pub struct PassageIndex {
    passages: Vec<Passage>,
}

impl PassageIndex {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }

    /// Parse `passages.json`
    ///
    /// Array position is authoritative: the `id` field is overwritten with it
    /// so lookups can never disagree with the embedding row.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut passages: Vec<Passage> = serde_json::from_slice(bytes)?;
        for (i, p) in passages.iter_mut().enumerate() {
            if p.id != i {
                tracing::debug!("Passage {} carried id {}, reindexing", i, p.id);
                p.id = i;
            }
        }
        Ok(Self { passages })
    }

    pub fn get(&self, id: usize) -> Option<&Passage> {
        self.passages.get(id)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Passage> {
        self.passages.iter()
    }

    /// All passages containing the given verse
    pub fn containing_verse(&self, verse_id: usize) -> impl Iterator<Item = &Passage> {
        self.passages
            .iter()
            .filter(move |p| p.verse_ids.contains(&verse_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSAGES: &str = r#"[
        {"id": 0, "title": "The Creation", "ref": "Genesis 1:1–2:3", "book": "Genesis",
         "book_num": 1, "testament": "OT", "chapter": 1, "start_verse": 1, "end_verse": 31,
         "verse_ids": [0, 1, 2], "n_verses": 3, "text": "In the beginning..."},
        {"id": 7, "title": "The Word Became Flesh", "ref": "John 1:1–1:18", "book": "John",
         "book_num": 43, "testament": "NT", "chapter": 1, "start_verse": 1, "end_verse": 18,
         "verse_ids": [5, 6, 7], "n_verses": 3, "text": "In the beginning was the Word",
         "text_bsb": "In the beginning was the Word, and the Word was with God"}
    ]"#;

    #[test]
    fn test_parse_passages() {
        let index = PassageIndex::from_json(PASSAGES.as_bytes()).unwrap();
        assert_eq!(index.len(), 2);

        let john = index.get(1).unwrap();
        assert_eq!(john.id, 1, "id follows array position");
        assert_eq!(john.verse_ids, vec![5, 6, 7]);
        assert_eq!(john.testament, Testament::New);
        assert!(john.alternate_text.is_some());
        assert!(index.get(0).unwrap().alternate_text.is_none());
    }

    #[test]
    fn test_display_text() {
        let index = PassageIndex::from_json(PASSAGES.as_bytes()).unwrap();
        let genesis = index.get(0).unwrap();
        assert_eq!(genesis.display_text(Translation::Bsb), "In the beginning...");

        let john = index.get(1).unwrap();
        assert!(john.display_text(Translation::Bsb).contains("with God"));
    }

    #[test]
    fn test_containing_verse() {
        let index = PassageIndex::from_json(PASSAGES.as_bytes()).unwrap();
        let hits: Vec<_> = index.containing_verse(6).map(|p| p.id).collect();
        assert_eq!(hits, vec![1]);
    }
}
