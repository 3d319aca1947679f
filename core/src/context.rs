//! Notifications from the engine to its host.
//!
//! The engine reports every visible change through a `CompositionListener`.
//! All methods default to no-ops, so a host implements only what it shows.
//! `ImeContext` is the stock listener: a plain data container the host reads
//! after each key, plus an event log that tests and tools replay.

use crate::candidate::Candidate;

/// Receiver of composition events. Called synchronously from the engine.
pub trait CompositionListener {
    /// Display labels of the accumulated keys, joined ("" after a reset).
    fn on_keynames_change(&mut self, _keynames: &str) {}

    /// The full candidate list changed.
    fn on_candidates_change(&mut self, _candidates: &[Candidate]) {}

    /// The visible page changed (new list or paging).
    fn on_current_candidates_change(&mut self, _page: &[Candidate]) {}

    /// An end key (or space) moved the session into selection.
    fn on_end_key(&mut self, _page: &[Candidate]) {}

    /// Text to insert into the document.
    fn on_commit(&mut self, _text: &str) {}
}

/// Listener that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl CompositionListener for NullListener {}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionEvent {
    Keynames(String),
    Candidates(Vec<String>),
    CurrentCandidates(Vec<String>),
    EndKey(Vec<String>),
    Commit(String),
}

fn texts(candidates: &[Candidate]) -> Vec<String> {
    candidates.iter().map(|c| c.text.clone()).collect()
}

/// Stock listener mirroring the latest composition state.
#[derive(Debug, Clone, Default)]
pub struct ImeContext {
    /// Joined keynames of the accumulated keys (preedit)
    pub keynames: String,

    /// Full candidate list
    pub candidates: Vec<String>,

    /// Candidates on the visible page
    pub page: Vec<String>,

    /// Committed text not yet consumed by the host
    pub commit_text: String,

    /// Every notification, oldest first
    pub events: Vec<CompositionEvent>,
}

impl ImeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the commit text, leaving it empty.
    pub fn take_commit(&mut self) -> String {
        std::mem::take(&mut self.commit_text)
    }

    /// Take the event log, leaving it empty.
    pub fn take_events(&mut self) -> Vec<CompositionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Check if there's any visible state (preedit or candidates).
    pub fn has_visible_state(&self) -> bool {
        !self.keynames.is_empty() || !self.page.is_empty()
    }

    /// Clear mirrored state and the log, keeping uncommitted text.
    pub fn clear(&mut self) {
        self.keynames.clear();
        self.candidates.clear();
        self.page.clear();
        self.events.clear();
    }
}

impl CompositionListener for ImeContext {
    fn on_keynames_change(&mut self, keynames: &str) {
        self.keynames = keynames.to_string();
        self.events.push(CompositionEvent::Keynames(keynames.to_string()));
    }

    fn on_candidates_change(&mut self, candidates: &[Candidate]) {
        self.candidates = texts(candidates);
        self.events
            .push(CompositionEvent::Candidates(self.candidates.clone()));
    }

    fn on_current_candidates_change(&mut self, page: &[Candidate]) {
        self.page = texts(page);
        self.events
            .push(CompositionEvent::CurrentCandidates(self.page.clone()));
    }

    fn on_end_key(&mut self, page: &[Candidate]) {
        self.events.push(CompositionEvent::EndKey(texts(page)));
    }

    fn on_commit(&mut self, text: &str) {
        self.commit_text.push_str(text);
        self.events.push(CompositionEvent::Commit(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_accumulate_until_taken() {
        let mut ctx = ImeContext::new();
        ctx.on_commit("日");
        ctx.on_commit("月");
        assert_eq!(ctx.take_commit(), "日月");
        assert_eq!(ctx.take_commit(), "");
        assert_eq!(ctx.events.len(), 2);
    }

    #[test]
    fn mirrors_latest_state() {
        let mut ctx = ImeContext::new();
        let list = vec![Candidate::new("a", "x"), Candidate::new("a", "y")];
        ctx.on_keynames_change("日");
        ctx.on_candidates_change(&list);
        ctx.on_current_candidates_change(&list[..1]);
        assert!(ctx.has_visible_state());
        assert_eq!(ctx.candidates, vec!["x", "y"]);
        assert_eq!(ctx.page, vec!["x"]);

        ctx.clear();
        assert!(!ctx.has_visible_state());
        assert!(ctx.events.is_empty());
    }
}
