//! Composition session state.
//!
//! One `CompositionSession` per engine. It tracks the accumulated keys, the
//! status and the paginated candidate list between key events, and is fully
//! cleared after every commit or reset.

use crate::candidate::{Candidate, CandidateList};

/// Composition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Accumulating keys (initial state)
    #[default]
    Input,
    /// A candidate list is shown and keys pick from it
    Selecting,
}

#[derive(Debug, Clone)]
pub struct CompositionSession {
    enabled: bool,
    status: Status,
    keys: String,
    candidates: CandidateList,
}

impl CompositionSession {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            enabled: true,
            status: Status::Input,
            keys: String::new(),
            candidates: CandidateList::with_page_size(page_size),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Accumulated keys.
    pub fn keys(&self) -> &str {
        &self.keys
    }

    pub(crate) fn push_key(&mut self, key: char) {
        self.keys.push(key);
    }

    pub(crate) fn set_keys(&mut self, keys: String) {
        self.keys = keys;
    }

    /// Number of accumulated keys (characters, not bytes).
    pub fn key_count(&self) -> usize {
        self.keys.chars().count()
    }

    pub fn candidates(&self) -> &CandidateList {
        &self.candidates
    }

    pub(crate) fn candidates_mut(&mut self) -> &mut CandidateList {
        &mut self.candidates
    }

    pub(crate) fn set_candidates(&mut self, candidates: Vec<Candidate>) {
        self.candidates.set_candidates(candidates);
    }

    /// Back to INPUT with no keys and no candidates. Does not touch `enabled`.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.candidates.clear();
        self.status = Status::Input;
    }

    /// True when there is nothing to show.
    pub fn is_idle(&self) -> bool {
        self.keys.is_empty() && self.candidates.is_empty() && self.status == Status::Input
    }
}

impl Default for CompositionSession {
    fn default() -> Self {
        Self::with_page_size(10)
    }
}
