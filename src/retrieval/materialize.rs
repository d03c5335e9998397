//! Turns filtered candidates into display entries, highlights and aim

use crate::corpus::{CorpusEntry, PassageIndex, Point3, Translation, VerseIndex};
use crate::retrieval::{RankedMatch, SearchMode};
use serde::Serialize;

/// Entries shown per search
pub const DEFAULT_DISPLAY_LIMIT: usize = 15;

/// One displayed result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    /// 1-based position in the shown list
    pub rank: usize,
    pub id: usize,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub book_num: u8,
    /// Score relative to the best shown entry, floored at zero
    pub relevance_percent: u32,
    pub score: f32,
    /// Verses covered by the entry, in order
    pub verse_ids: Vec<usize>,
}

impl ResultEntry {
    /// Text cut to at most `max_chars` characters, with an ellipsis when cut
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => format!("{}…", &self.text[..byte_idx]),
            None => self.text.clone(),
        }
    }
}

/// A verse to light up on the sphere
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub verse_id: usize,
    pub reference: String,
    pub position: Point3,
}

/// Where the camera should turn to frame the highlights
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aim {
    pub centroid: Point3,
    /// Angle of the centroid around the vertical axis, `atan2(y, x)`
    pub azimuth: f32,
}

/// Mean of the given positions, or `None` for an empty slice
pub fn aim(points: &[Point3]) -> Option<Aim> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f32;
    let (sx, sy, sz) = points.iter().fold((0.0f32, 0.0f32, 0.0f32), |acc, p| {
        (acc.0 + p.x, acc.1 + p.y, acc.2 + p.z)
    });
    let centroid = Point3::new(sx / n, sy / n, sz / n);

    Some(Aim {
        centroid,
        azimuth: centroid.y.atan2(centroid.x),
    })
}

/// Everything a search hands to the display layer
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub mode: SearchMode,
    pub entries: Vec<ResultEntry>,
    pub highlights: Vec<Highlight>,
    pub aim: Option<Aim>,
    /// Candidates kept by the ranking pass, before filtering
    pub candidate_count: usize,
    /// Candidates left after filtering, before the display cap
    pub filtered_count: usize,
}

/// Builds [`SearchResults`] from a filtered, rank-ordered candidate list
#[derive(Debug, Clone, Copy)]
pub struct ResultMaterializer {
    display_limit: usize,
    translation: Translation,
}

impl Default for ResultMaterializer {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_LIMIT, Translation::default())
    }
}

impl ResultMaterializer {
    pub fn new(display_limit: usize, translation: Translation) -> Self {
        Self {
            display_limit,
            translation,
        }
    }

    pub fn with_translation(mut self, translation: Translation) -> Self {
        self.translation = translation;
        self
    }

    pub fn display_limit(&self) -> usize {
        self.display_limit
    }

    pub fn translation(&self) -> Translation {
        self.translation
    }

    /// Verse-mode results; `None` when nothing survived filtering
    pub fn materialize_verses(
        &self,
        filtered: &[RankedMatch],
        verses: &VerseIndex,
        candidate_count: usize,
    ) -> Option<SearchResults> {
        self.materialize(
            SearchMode::Verses,
            filtered,
            |i| verses.get(i),
            verses,
            candidate_count,
        )
    }

    /// Passage-mode results; each passage highlights every verse it spans
    pub fn materialize_passages(
        &self,
        filtered: &[RankedMatch],
        passages: &PassageIndex,
        verses: &VerseIndex,
        candidate_count: usize,
    ) -> Option<SearchResults> {
        self.materialize(
            SearchMode::Passages,
            filtered,
            |i| passages.get(i),
            verses,
            candidate_count,
        )
    }

    fn materialize<'a, E, F>(
        &self,
        mode: SearchMode,
        filtered: &[RankedMatch],
        lookup: F,
        verses: &VerseIndex,
        candidate_count: usize,
    ) -> Option<SearchResults>
    where
        E: CorpusEntry + 'a,
        F: Fn(usize) -> Option<&'a E>,
    {
        let best = filtered.first()?.score;

        let mut entries = Vec::with_capacity(self.display_limit.min(filtered.len()));
        for m in filtered.iter().take(self.display_limit) {
            let Some(item) = lookup(m.index) else {
                tracing::warn!("No {} entry for ranked index {}", mode, m.index);
                continue;
            };

            entries.push(ResultEntry {
                rank: entries.len() + 1,
                id: item.id(),
                reference: item.reference().to_string(),
                title: item.title().map(str::to_string),
                text: item.display_text(self.translation).to_string(),
                book_num: item.book_num(),
                relevance_percent: relevance_percent(m.score, best),
                score: m.score,
                verse_ids: item.verse_ids().to_vec(),
            });
        }

        let highlights: Vec<Highlight> = entries
            .iter()
            .flat_map(|e| e.verse_ids.iter())
            .filter_map(|&id| verses.get(id))
            .map(|v| Highlight {
                verse_id: v.id,
                reference: v.reference.clone(),
                position: v.position,
            })
            .collect();

        let positions: Vec<Point3> = highlights.iter().map(|h| h.position).collect();

        Some(SearchResults {
            mode,
            entries,
            aim: aim(&positions),
            highlights,
            candidate_count,
            filtered_count: filtered.len(),
        })
    }
}

/// `round(max(0, score / best * 100))`
fn relevance_percent(score: f32, best: f32) -> u32 {
    (score / best * 100.0).max(0.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Passage, Testament, Verse};

    fn verse(id: usize, book_num: u8, reference: &str, x: f32) -> Verse {
        Verse {
            id,
            reference: reference.to_string(),
            book_name: "John".to_string(),
            book_num,
            testament: Testament::New,
            text: format!("kjv text {}", id),
            alternate_text: (id % 2 == 0).then(|| format!("bsb text {}", id)),
            position: Point3::new(x, 1.0, 0.0),
        }
    }

    fn verse_index(n: usize) -> VerseIndex {
        VerseIndex::new(
            (0..n)
                .map(|i| verse(i, 43, &format!("John 1:{}", i + 1), i as f32))
                .collect(),
        )
    }

    fn passage(id: usize, verse_ids: Vec<usize>) -> Passage {
        Passage {
            id,
            title: format!("Passage {}", id),
            reference: format!("John 1:{}-{}", verse_ids[0] + 1, verse_ids[verse_ids.len() - 1] + 1),
            book_name: "John".to_string(),
            book_num: 43,
            testament: Testament::New,
            chapter: 1,
            start_verse: verse_ids[0] as u32 + 1,
            end_verse: verse_ids[verse_ids.len() - 1] as u32 + 1,
            verse_ids,
            text: "In the beginning was the Word".to_string(),
            alternate_text: None,
        }
    }

    #[test]
    fn test_relevance_percent() {
        assert_eq!(relevance_percent(0.8, 0.8), 100);
        assert_eq!(relevance_percent(0.4, 0.8), 50);
        assert_eq!(relevance_percent(0.333, 0.8), 42);
        assert_eq!(relevance_percent(-0.1, 0.8), 0);
    }

    #[test]
    fn test_empty_filtered_set_is_none() {
        let verses = verse_index(3);
        assert!(ResultMaterializer::default()
            .materialize_verses(&[], &verses, 3)
            .is_none());
    }

    #[test]
    fn test_verse_entries() {
        let verses = verse_index(5);
        let filtered = vec![
            RankedMatch::new(2, 0.8),
            RankedMatch::new(4, 0.6),
            RankedMatch::new(1, 0.2),
        ];

        let results = ResultMaterializer::default()
            .materialize_verses(&filtered, &verses, 5)
            .unwrap();

        assert_eq!(results.mode, SearchMode::Verses);
        assert_eq!(results.filtered_count, 3);
        let refs: Vec<_> = results.entries.iter().map(|e| e.reference.as_str()).collect();
        assert_eq!(refs, vec!["John 1:3", "John 1:5", "John 1:2"]);
        let ranks: Vec<_> = results.entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        let pct: Vec<_> = results
            .entries
            .iter()
            .map(|e| e.relevance_percent)
            .collect();
        assert_eq!(pct, vec![100, 75, 25]);

        assert_eq!(results.highlights.len(), 3);
        assert_eq!(results.highlights[0].verse_id, 2);
        assert!(results.entries[0].title.is_none());
    }

    #[test]
    fn test_translation_fallback() {
        let verses = verse_index(4);
        let filtered = vec![RankedMatch::new(2, 0.9), RankedMatch::new(3, 0.5)];

        let results = ResultMaterializer::new(15, Translation::Bsb)
            .materialize_verses(&filtered, &verses, 4)
            .unwrap();
        assert_eq!(results.entries[0].text, "bsb text 2");
        // Verse 3 has no alternate text
        assert_eq!(results.entries[1].text, "kjv text 3");
    }

    #[test]
    fn test_display_cap() {
        let verses = verse_index(40);
        let filtered: Vec<_> = (0..40)
            .map(|i| RankedMatch::new(i, 1.0 - i as f32 / 100.0))
            .collect();

        let results = ResultMaterializer::default()
            .materialize_verses(&filtered, &verses, 40)
            .unwrap();
        assert_eq!(results.entries.len(), 15);
        assert_eq!(results.filtered_count, 40);
        assert_eq!(results.highlights.len(), 15);
    }

    #[test]
    fn test_passage_highlights_follow_verse_ids() {
        let verses = verse_index(10);
        let passages = PassageIndex::new(vec![passage(0, vec![0, 1]), passage(1, vec![5, 6, 7])]);

        let results = ResultMaterializer::default()
            .materialize_passages(&[RankedMatch::new(1, 0.7)], &passages, &verses, 2)
            .unwrap();

        assert_eq!(results.mode, SearchMode::Passages);
        assert_eq!(results.entries[0].title.as_deref(), Some("Passage 1"));
        assert_eq!(results.entries[0].verse_ids, vec![5, 6, 7]);

        let ids: Vec<_> = results.highlights.iter().map(|h| h.verse_id).collect();
        assert_eq!(ids, vec![5, 6, 7]);

        // Positions are (id, 1, 0); centroid is (6, 1, 0)
        let aim = results.aim.unwrap();
        assert!((aim.centroid.x - 6.0).abs() < 1e-6);
        assert!((aim.centroid.y - 1.0).abs() < 1e-6);
        assert!((aim.azimuth - 1.0f32.atan2(6.0)).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_highlight_verses_skipped() {
        let verses = verse_index(3);
        let passages = PassageIndex::new(vec![passage(0, vec![1, 2, 3, 4])]);

        let results = ResultMaterializer::default()
            .materialize_passages(&[RankedMatch::new(0, 0.5)], &passages, &verses, 1)
            .unwrap();
        let ids: Vec<_> = results.highlights.iter().map(|h| h.verse_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_preview() {
        let mut entry = ResultEntry {
            rank: 1,
            id: 0,
            reference: "Gen 1:1".to_string(),
            title: None,
            text: "In the beginning".to_string(),
            book_num: 1,
            relevance_percent: 100,
            score: 1.0,
            verse_ids: vec![0],
        };
        assert_eq!(entry.preview(200), "In the beginning");
        assert_eq!(entry.preview(6), "In the…");

        entry.text = "ἐν ἀρχῇ ἦν".to_string();
        assert_eq!(entry.preview(2), "ἐν…");
    }

    #[test]
    fn test_aim_empty() {
        assert!(aim(&[]).is_none());
    }
}
