//! Book filter applied to ranked candidates

use crate::corpus::{book, Testament, BOOK_COUNT};
use crate::retrieval::RankedMatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How much of a testament the filter currently allows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestamentState {
    All,
    Partial,
    Off,
}

/// Set of book numbers allowed in results
///
/// Defaults to every book. Only explicit toggles change it; a ranking pass
/// works on a cloned snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    books: BTreeSet<u8>,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FilterSet {
    /// Every canonical book
    pub fn all() -> Self {
        Self {
            books: (1..=BOOK_COUNT).collect(),
        }
    }

    /// No books at all (every search yields no results)
    pub fn none() -> Self {
        Self {
            books: BTreeSet::new(),
        }
    }

    /// Only the given books; numbers outside 1..=66 are ignored
    pub fn from_books(books: impl IntoIterator<Item = u8>) -> Self {
        Self {
            books: books.into_iter().filter(|&b| book(b).is_some()).collect(),
        }
    }

    /// Only the books of one testament
    pub fn testament(testament: Testament) -> Self {
        Self::from_books(testament.books())
    }

    pub fn contains(&self, book_num: u8) -> bool {
        self.books.contains(&book_num)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn is_all(&self) -> bool {
        self.books.len() == BOOK_COUNT as usize
    }

    pub fn books(&self) -> impl Iterator<Item = u8> + '_ {
        self.books.iter().copied()
    }

    pub fn is_subset_of(&self, other: &FilterSet) -> bool {
        self.books.is_subset(&other.books)
    }

    /// Allow or disallow one book
    pub fn set_book(&mut self, book_num: u8, allowed: bool) {
        if book(book_num).is_none() {
            tracing::debug!("Ignoring filter change for unknown book {}", book_num);
            return;
        }
        if allowed {
            self.books.insert(book_num);
        } else {
            self.books.remove(&book_num);
        }
    }

    /// Flip one book, returning whether it is now allowed
    pub fn toggle_book(&mut self, book_num: u8) -> bool {
        let now = !self.contains(book_num);
        self.set_book(book_num, now);
        self.contains(book_num)
    }

    /// Allow or disallow every book of a testament
    pub fn set_testament(&mut self, testament: Testament, allowed: bool) {
        for b in testament.books() {
            self.set_book(b, allowed);
        }
    }

    /// Testament master toggle: a partial selection turns fully on,
    /// otherwise the testament flips. Returns the new state.
    pub fn toggle_testament(&mut self, testament: Testament) -> TestamentState {
        let allowed = match self.testament_state(testament) {
            TestamentState::Partial | TestamentState::Off => true,
            TestamentState::All => false,
        };
        self.set_testament(testament, allowed);
        self.testament_state(testament)
    }

    pub fn testament_state(&self, testament: Testament) -> TestamentState {
        let total = testament.books().count();
        let on = testament.books().filter(|b| self.contains(*b)).count();
        match on {
            0 => TestamentState::Off,
            n if n == total => TestamentState::All,
            _ => TestamentState::Partial,
        }
    }

    /// Short label for the filter button ("All books", "None", "3 / 66 books")
    pub fn label(&self) -> String {
        if self.is_all() {
            "All books".to_string()
        } else if self.is_empty() {
            "None".to_string()
        } else {
            format!("{} / {} books", self.len(), BOOK_COUNT)
        }
    }

    /// Keep candidates whose book is allowed, preserving rank order
    ///
    /// `book_of` maps a candidate index to its book number; candidates the
    /// corpus does not know are dropped.
    pub fn apply<F>(&self, candidates: &[RankedMatch], book_of: F) -> Vec<RankedMatch>
    where
        F: Fn(usize) -> Option<u8>,
    {
        candidates
            .iter()
            .filter(|m| match book_of(m.index) {
                Some(b) => self.contains(b),
                None => {
                    tracing::warn!("Ranked index {} has no corpus entry", m.index);
                    false
                }
            })
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_all_books() {
        let filter = FilterSet::default();
        assert!(filter.is_all());
        assert_eq!(filter.len(), 66);
        assert_eq!(filter.label(), "All books");
    }

    #[test]
    fn test_toggle_book() {
        let mut filter = FilterSet::all();
        assert!(!filter.toggle_book(43));
        assert!(!filter.contains(43));
        assert_eq!(filter.label(), "65 / 66 books");
        assert!(filter.toggle_book(43));
        assert!(filter.is_all());
    }

    #[test]
    fn test_unknown_books_ignored() {
        let filter = FilterSet::from_books([0, 1, 67, 200]);
        assert_eq!(filter.books().collect::<Vec<_>>(), vec![1]);

        let mut filter = FilterSet::none();
        filter.set_book(99, true);
        assert!(filter.is_empty());
        assert_eq!(filter.label(), "None");
    }

    #[test]
    fn test_testament_toggle() {
        let mut filter = FilterSet::all();
        assert_eq!(filter.testament_state(Testament::Old), TestamentState::All);

        assert_eq!(filter.toggle_testament(Testament::Old), TestamentState::Off);
        assert_eq!(filter.len(), 27);

        // Partial selection turns fully on
        filter.set_book(1, true);
        assert_eq!(
            filter.testament_state(Testament::Old),
            TestamentState::Partial
        );
        assert_eq!(filter.toggle_testament(Testament::Old), TestamentState::All);
        assert!(filter.is_all());
    }

    #[test]
    fn test_apply_preserves_order() {
        let candidates = vec![
            RankedMatch::new(3, 0.9),
            RankedMatch::new(0, 0.8),
            RankedMatch::new(2, 0.7),
            RankedMatch::new(1, 0.6),
        ];
        // index -> book: 0,1 are Genesis; 2,3 are John
        let book_of = |i: usize| match i {
            0 | 1 => Some(1),
            2 | 3 => Some(43),
            _ => None,
        };

        let kept = FilterSet::from_books([43]).apply(&candidates, book_of);
        let indices: Vec<_> = kept.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![3, 2]);

        let kept = FilterSet::all().apply(&candidates, book_of);
        assert_eq!(kept, candidates);
    }

    #[test]
    fn test_apply_drops_unknown_indices() {
        let candidates = vec![RankedMatch::new(9, 0.5)];
        let kept = FilterSet::all().apply(&candidates, |_| None);
        assert!(kept.is_empty());
    }
}
