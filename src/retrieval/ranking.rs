//! Exhaustive dot-product ranking over a quantized store

use crate::embedding::QuantizedStore;
use crate::retrieval::RankedMatch;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Candidates kept before filtering
pub const DEFAULT_CANDIDATE_WINDOW: usize = 200;

/// Rows scored per rayon task
const SCORE_CHUNK_ROWS: usize = 1024;

/// Score descending, then index ascending
fn by_rank(a: &RankedMatch, b: &RankedMatch) -> Ordering {
    b.score.total_cmp(&a.score).then(a.index.cmp(&b.index))
}

/// Scores every store item against a query and keeps the best candidates
///
/// One engine serves both verse and passage stores.
#[derive(Debug, Clone, Copy)]
pub struct RankingEngine {
    candidate_window: usize,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATE_WINDOW)
    }
}

impl RankingEngine {
    pub fn new(candidate_window: usize) -> Self {
        Self { candidate_window }
    }

    pub fn candidate_window(&self) -> usize {
        self.candidate_window
    }

    /// Score of every item, in index order
    ///
    /// # Panics
    /// If the query length differs from the store dimension.
    pub fn score_all(&self, query: &[f32], store: &QuantizedStore) -> Vec<f32> {
        assert_eq!(
            query.len(),
            store.dimension(),
            "query vector length must match store `{}` dimension",
            store.name()
        );

        let dimension = store.dimension();
        store
            .as_bytes()
            .par_chunks(dimension * SCORE_CHUNK_ROWS)
            .flat_map_iter(|block| {
                block
                    .chunks_exact(dimension)
                    .map(|row| QuantizedStore::dot(row, query))
            })
            .collect()
    }

    /// Top `candidate_window` matches, best first, ties by lower index
    ///
    /// # Panics
    /// If the query length differs from the store dimension.
    pub fn rank(&self, query: &[f32], store: &QuantizedStore) -> Vec<RankedMatch> {
        let started = std::time::Instant::now();

        let mut matches: Vec<RankedMatch> = self
            .score_all(query, store)
            .into_iter()
            .enumerate()
            .map(|(index, score)| RankedMatch::new(index, score))
            .collect();

        let keep = self.candidate_window.min(matches.len());
        if keep == 0 {
            return Vec::new();
        }

        if keep < matches.len() {
            matches.select_nth_unstable_by(keep - 1, by_rank);
            matches.truncate(keep);
        }
        matches.sort_unstable_by(by_rank);

        tracing::debug!(
            store = store.name(),
            items = store.item_count(),
            kept = matches.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ranked store"
        );

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{dequantize, normalize_l2, quantize_vector};

    /// 4 items, dimension 4
    ///
    /// item 0: 255 127 127 127 -> ( 1.0, -1/255, -1/255, -1/255)
    /// item 1: 127 255 127 127 -> (-1/255,  1.0, -1/255, -1/255)
    /// item 2: 200 200 127 127 -> ( 0.568..,  0.568.., -1/255, -1/255)
    /// item 3:   0 127 127 127 -> (-1.0, -1/255, -1/255, -1/255)
    fn toy_store() -> QuantizedStore {
        let bytes = vec![
            255, 127, 127, 127, //
            127, 255, 127, 127, //
            200, 200, 127, 127, //
            0, 127, 127, 127,
        ];
        QuantizedStore::from_bytes("toy", bytes, 4).unwrap()
    }

    #[test]
    fn test_toy_store_top1_by_hand() {
        let engine = RankingEngine::default();
        let query = [1.0, 0.0, 0.0, 0.0];

        let ranked = engine.rank(&query, &toy_store());
        assert_eq!(ranked.len(), 4);

        // Only the first component contributes
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[0].score, 1.0);
        assert_eq!(ranked[1].index, 2);
        assert_eq!(ranked[1].score, (200.0f64 / 127.5 - 1.0) as f32);
        assert_eq!(ranked[2].index, 1);
        assert_eq!(ranked[2].score, (127.0f64 / 127.5 - 1.0) as f32);
        assert_eq!(ranked[3].index, 3);
        assert_eq!(ranked[3].score, -1.0);
    }

    #[test]
    fn test_diagonal_query() {
        let engine = RankingEngine::default();
        let h = std::f32::consts::FRAC_1_SQRT_2;
        let ranked = engine.rank(&[h, h, 0.0, 0.0], &toy_store());

        // item 2 scores about 0.804; items 0 and 1 tie at about 0.704
        assert_eq!(ranked[0].index, 2);
        assert_eq!(ranked[1].index, 0, "tie broken by lower index");
        assert_eq!(ranked[2].index, 1);
        assert_eq!(ranked[1].score, ranked[2].score);
    }

    #[test]
    fn test_candidate_window_bounds() {
        let store = toy_store();
        let ranked = RankingEngine::new(2).rank(&[1.0, 0.0, 0.0, 0.0], &store);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[1].index, 2);

        let ranked = RankingEngine::new(0).rank(&[1.0, 0.0, 0.0, 0.0], &store);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_empty_store() {
        let store = QuantizedStore::from_bytes("empty", vec![], 4).unwrap();
        assert!(RankingEngine::default()
            .rank(&[1.0, 0.0, 0.0, 0.0], &store)
            .is_empty());
    }

    #[test]
    #[should_panic(expected = "dimension")]
    fn test_dimension_mismatch_panics() {
        RankingEngine::default().rank(&[1.0, 0.0], &toy_store());
    }

    fn pseudo_random_store(items: usize, dimension: usize) -> QuantizedStore {
        // Deterministic LCG so the test needs no rng crate
        let mut state = 0x2545_f491_u32;
        let mut bytes = Vec::with_capacity(items * dimension);
        for _ in 0..items * dimension {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            bytes.push((state >> 24) as u8);
        }
        QuantizedStore::from_bytes("random", bytes, dimension).unwrap()
    }

    #[test]
    fn test_parallel_scan_matches_serial() {
        let store = pseudo_random_store(3000, 16);
        let mut query: Vec<f32> = (0..16).map(|i| (i as f32 * 0.37).sin()).collect();
        normalize_l2(&mut query);

        let parallel = RankingEngine::default().score_all(&query, &store);
        let serial: Vec<f32> = store
            .rows()
            .map(|row| QuantizedStore::dot(row, &query))
            .collect();
        assert_eq!(parallel, serial);
    }

    #[test]
    fn test_ranked_sorted_and_deterministic() {
        let store = pseudo_random_store(3000, 16);
        let mut query: Vec<f32> = (0..16).map(|i| (i as f32).cos()).collect();
        normalize_l2(&mut query);

        let engine = RankingEngine::default();
        let first = engine.rank(&query, &store);
        let second = engine.rank(&query, &store);

        assert_eq!(first.len(), 200);
        assert_eq!(first, second);
        for pair in first.windows(2) {
            assert!(by_rank(&pair[0], &pair[1]) == Ordering::Less);
        }

        // Nothing outside the window beats the last kept candidate
        let scores = engine.score_all(&query, &store);
        let last = first.last().unwrap();
        let kept: std::collections::HashSet<usize> = first.iter().map(|m| m.index).collect();
        for (i, s) in scores.iter().enumerate() {
            if !kept.contains(&i) {
                assert!(by_rank(last, &RankedMatch::new(i, *s)) == Ordering::Less);
            }
        }
    }

    #[test]
    fn test_self_score_is_maximal() {
        let store = pseudo_random_store(500, 32);
        let target = 137;

        let mut query = store.dequantized(target).unwrap();
        normalize_l2(&mut query);

        let ranked = RankingEngine::default().rank(&query, &store);
        assert_eq!(ranked[0].index, target);

        let norm: f32 = store
            .item(target)
            .unwrap()
            .iter()
            .map(|&b| dequantize(b).powi(2))
            .sum::<f32>()
            .sqrt();
        assert!((ranked[0].score - norm).abs() < 1e-3);
    }

    #[test]
    fn test_quantized_unit_vector_scores_near_one() {
        let mut v: Vec<f32> = (0..64).map(|i| ((i * 7 % 13) as f32) - 6.0).collect();
        normalize_l2(&mut v);
        let store = QuantizedStore::from_bytes("one", quantize_vector(&v), 64).unwrap();

        let mut query = store.dequantized(0).unwrap();
        normalize_l2(&mut query);
        let score = store.score(0, &query).unwrap();
        assert!((score - 1.0).abs() < 0.05, "self score {}", score);
    }
}
