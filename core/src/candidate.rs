//! Candidate types for table lookups.
//!
//! This module provides:
//! - `Candidate`: one keycode/text record returned by a table store
//! - `CandidateList`: paginated candidate list with a 1-based page cursor

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A single candidate: the keycode it was found under and its text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub keycode: String,
    pub text: String,
}

impl Candidate {
    pub fn new<K: Into<String>, T: Into<String>>(keycode: K, text: T) -> Self {
        Candidate {
            keycode: keycode.into(),
            text: text.into(),
        }
    }
}

/// A paginated list of candidates.
///
/// Pages are numbered from 1. `current_page()` is 0 exactly when the list is
/// empty. Paging wraps around in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList {
    candidates: Vec<Candidate>,

    /// Number of candidates per page (>= 1)
    page_size: usize,

    /// Current page (1-based, 0 when empty)
    current_page: usize,
}

impl CandidateList {
    /// Create an empty list with the given page size.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            candidates: Vec::new(),
            page_size: page_size.max(1),
            current_page: 0,
        }
    }

    /// Set the page size, returning to the first page.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.rewind();
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Replace the candidates and go back to the first page.
    pub fn set_candidates(&mut self, candidates: Vec<Candidate>) {
        self.candidates = candidates;
        self.rewind();
    }

    /// Take the candidates out, leaving the list empty.
    pub fn take(&mut self) -> Vec<Candidate> {
        self.current_page = 0;
        std::mem::take(&mut self.candidates)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Total number of pages (ceiling division).
    pub fn num_pages(&self) -> usize {
        self.candidates.len().div_ceil(self.page_size)
    }

    /// Current page, 1-based; 0 when there are no candidates.
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Go to page 1, or page 0 when empty.
    pub fn rewind(&mut self) {
        self.current_page = if self.candidates.is_empty() { 0 } else { 1 };
    }

    fn current_page_range(&self) -> Range<usize> {
        if self.current_page == 0 {
            return 0..0;
        }
        let start = (self.current_page - 1) * self.page_size;
        let end = (start + self.page_size).min(self.candidates.len());
        start.min(end)..end
    }

    /// Candidates on the current page.
    pub fn current_page_candidates(&self) -> &[Candidate] {
        &self.candidates[self.current_page_range()]
    }

    /// Candidate at `index` within the current page.
    pub fn page_candidate(&self, index: usize) -> Option<&Candidate> {
        self.current_page_candidates().get(index)
    }

    /// Move to the previous page, wrapping from the first to the last.
    /// Returns false (and stays on page 0) when there are no candidates.
    pub fn page_up(&mut self) -> bool {
        let pages = self.num_pages();
        if pages == 0 {
            self.current_page = 0;
            return false;
        }
        self.current_page = if self.current_page <= 1 {
            pages
        } else {
            self.current_page - 1
        };
        true
    }

    /// Move to the next page, wrapping from the last to the first.
    /// Returns false (and stays on page 0) when there are no candidates.
    pub fn page_down(&mut self) -> bool {
        let pages = self.num_pages();
        if pages == 0 {
            self.current_page = 0;
            return false;
        }
        self.current_page = if self.current_page >= pages {
            1
        } else {
            self.current_page + 1
        };
        true
    }

    /// Clear the candidate list.
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.current_page = 0;
    }
}

impl Default for CandidateList {
    fn default() -> Self {
        Self::with_page_size(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(n: usize, page_size: usize) -> CandidateList {
        let mut l = CandidateList::with_page_size(page_size);
        l.set_candidates(
            (0..n)
                .map(|i| Candidate::new("k", format!("c{}", i)))
                .collect(),
        );
        l
    }

    #[test]
    fn empty_list_has_page_zero() {
        let l = CandidateList::with_page_size(3);
        assert_eq!(l.current_page(), 0);
        assert_eq!(l.num_pages(), 0);
        assert!(l.current_page_candidates().is_empty());
    }

    #[test]
    fn pages_use_ceiling_division() {
        let l = list(7, 3);
        assert_eq!(l.num_pages(), 3);
        assert_eq!(l.current_page(), 1);
        let texts: Vec<_> = l.current_page_candidates().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn last_page_is_short() {
        let mut l = list(7, 3);
        assert!(l.page_up());
        assert_eq!(l.current_page(), 3);
        assert_eq!(l.current_page_candidates().len(), 1);
        assert_eq!(l.page_candidate(0).unwrap().text, "c6");
        assert!(l.page_candidate(1).is_none());
    }

    #[test]
    fn paging_wraps_both_ways() {
        let mut l = list(5, 2);
        assert!(l.page_down());
        assert_eq!(l.current_page(), 2);
        assert!(l.page_down());
        assert_eq!(l.current_page(), 3);
        assert!(l.page_down());
        assert_eq!(l.current_page(), 1);
        assert!(l.page_up());
        assert_eq!(l.current_page(), 3);
    }

    #[test]
    fn paging_empty_list_fails() {
        let mut l = CandidateList::with_page_size(2);
        assert!(!l.page_down());
        assert!(!l.page_up());
        assert_eq!(l.current_page(), 0);
    }

    #[test]
    fn page_size_is_at_least_one() {
        let l = CandidateList::with_page_size(0);
        assert_eq!(l.page_size(), 1);
    }

    #[test]
    fn take_empties_the_list() {
        let mut l = list(3, 2);
        let taken = l.take();
        assert_eq!(taken.len(), 3);
        assert!(l.is_empty());
        assert_eq!(l.current_page(), 0);
    }
}
