//! Table-driven composition engine.
//!
//! `CinEngine` runs the key-composition state machine over a shared
//! [`TableStore`]. It has two statuses:
//!
//! - `Input`: keys accumulate; candidates are looked up when the table asks
//!   for live matches, or when an end key, space or the fixed-length rule
//!   terminates the keycode
//! - `Selecting`: a multi-candidate list is shown; selection keys pick from
//!   the current page, space pages, anything else commits the first
//!   candidate and is then typed again
//!
//! Key handling is split in two phases so the table lookup can run
//! elsewhere: [`CinEngine::begin_key`] updates the session and, when a
//! lookup is needed, hands back a [`PendingLookup`]; the caller runs
//! [`PendingLookup::query`] and passes the result to
//! [`CinEngine::finish_key`]. Each pending lookup carries the session epoch,
//! which advances on every reset, commit and new lookup, so a result that
//! arrives after the session moved on is dropped. [`CinEngine::process_key`]
//! runs both phases back to back.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::candidate::{Candidate, CandidateList};
use crate::context::{CompositionListener, ImeContext};
use crate::error::TableError;
use crate::policy::Policy;
use crate::session::{CompositionSession, Status};
use crate::store::TableStore;
use crate::table::SpaceStyle;
use crate::Config;

/// Result of an editing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResult {
    /// Key was handled by the IME
    Handled,
    /// Key was not handled (pass through to application)
    NotHandled,
}

/// What the engine needs to look up for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub keycode: String,
    /// Try the quick index first; the chardef index is used when it is empty.
    pub quick: bool,
    /// Chardef prefix mode.
    pub prefix: bool,
    pub max_results: usize,
}

#[derive(Debug, Clone, Copy)]
struct KeyClass {
    space: bool,
    end: bool,
    selection: Option<usize>,
    keyname: bool,
}

/// Session snapshot taken when an INPUT key starts.
#[derive(Debug, Clone)]
struct InputStep {
    key: char,
    class: KeyClass,
    previous_keys: String,
    previous_candidates: Vec<Candidate>,
}

/// A lookup the engine is waiting on.
pub struct PendingLookup {
    epoch: u64,
    store: Arc<dyn TableStore>,
    query: LookupQuery,
    step: InputStep,
}

impl fmt::Debug for PendingLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLookup")
            .field("epoch", &self.epoch)
            .field("query", &self.query)
            .field("key", &self.step.key)
            .finish()
    }
}

impl PendingLookup {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn lookup_query(&self) -> &LookupQuery {
        &self.query
    }

    /// Run the lookup against the store. Safe to call from any thread.
    pub fn query(&self) -> Result<Vec<Candidate>, TableError> {
        let q = &self.query;
        if q.quick {
            let found = self.store.lookup_quick(&q.keycode)?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        self.store
            .lookup_chardef(&q.keycode, q.prefix, q.max_results)
    }
}

/// Outcome of [`CinEngine::begin_key`].
#[derive(Debug)]
pub enum KeyStep {
    /// The key is fully processed.
    Done,
    /// The key waits for a table lookup.
    Lookup(PendingLookup),
}

/// Outcome of [`CinEngine::finish_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// The session moved on since the lookup started; the result was dropped.
    Stale,
}

/// Composition engine over a keycode table.
pub struct CinEngine<L: CompositionListener = ImeContext> {
    store: Option<Arc<dyn TableStore>>,
    config: Config,
    policy: Policy,
    session: CompositionSession,
    listener: L,
    epoch: u64,
}

impl<L: CompositionListener + fmt::Debug> fmt::Debug for CinEngine<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CinEngine")
            .field("has_table", &self.has_table())
            .field("policy", &self.policy)
            .field("session", &self.session)
            .field("listener", &self.listener)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl CinEngine<ImeContext> {
    /// Engine over `store` with default configuration.
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self::with_listener(Some(store), Config::default(), ImeContext::new())
    }

    /// Engine over `store` with per-install overrides.
    pub fn with_config(store: Arc<dyn TableStore>, config: Config) -> Self {
        Self::with_listener(Some(store), config, ImeContext::new())
    }

    /// Engine with no table; every key passes through.
    pub fn unloaded() -> Self {
        Self::with_listener(None, Config::default(), ImeContext::new())
    }

    /// Shortcut for the stock listener.
    pub fn context(&self) -> &ImeContext {
        &self.listener
    }

    pub fn context_mut(&mut self) -> &mut ImeContext {
        &mut self.listener
    }
}

impl<L: CompositionListener> CinEngine<L> {
    pub fn with_listener(store: Option<Arc<dyn TableStore>>, config: Config, listener: L) -> Self {
        let policy = match &store {
            Some(s) => Policy::resolve(s.settings(), &config),
            None => Policy::resolve(&Default::default(), &config),
        };
        Self {
            session: CompositionSession::with_page_size(policy.page_size),
            store,
            config,
            policy,
            listener,
            epoch: 0,
        }
    }

    // ========== Accessors ==========

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn session(&self) -> &CompositionSession {
        &self.session
    }

    pub fn status(&self) -> Status {
        self.session.status()
    }

    pub fn keys(&self) -> &str {
        self.session.keys()
    }

    pub fn candidates(&self) -> &CandidateList {
        self.session.candidates()
    }

    pub fn current_page_candidates(&self) -> &[Candidate] {
        self.session.candidates().current_page_candidates()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_enabled(&self) -> bool {
        self.session.is_enabled()
    }

    /// True when a loaded table is attached.
    pub fn has_table(&self) -> bool {
        self.store.as_ref().is_some_and(|s| s.is_loaded())
    }

    /// Joined display labels of the accumulated keys.
    pub fn keynames(&self) -> String {
        match &self.store {
            Some(store) => self
                .session
                .keys()
                .chars()
                .filter_map(|k| store.keyname(k))
                .collect(),
            None => String::new(),
        }
    }

    // ========== Table and configuration ==========

    /// Attach a table, resetting the session.
    pub fn set_store(&mut self, store: Arc<dyn TableStore>) {
        self.store = Some(store);
        self.refresh_policy();
        self.reset();
    }

    /// Detach the table; keys pass through afterwards.
    pub fn clear_store(&mut self) {
        self.store = None;
        self.refresh_policy();
        self.reset();
    }

    /// Replace the per-install overrides, resetting the session.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
        self.refresh_policy();
        self.reset();
    }

    fn refresh_policy(&mut self) {
        self.policy = match &self.store {
            Some(s) => Policy::resolve(s.settings(), &self.config),
            None => Policy::resolve(&Default::default(), &self.config),
        };
        self.session
            .candidates_mut()
            .set_page_size(self.policy.page_size);
    }

    // ========== Session control ==========

    /// Enable or disable composition. Disabling resets the session.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.session.set_enabled(enabled);
        if !enabled {
            self.reset();
        }
    }

    /// Drop keys and candidates and notify the listener.
    pub fn reset(&mut self) {
        self.clear_session();
        self.listener.on_keynames_change("");
        self.fire_candidate_change();
    }

    fn clear_session(&mut self) {
        self.epoch += 1;
        self.session.clear();
    }

    /// Previous candidate page, wrapping to the last one.
    pub fn previous_page(&mut self) -> bool {
        if !self.session.candidates_mut().page_up() {
            return false;
        }
        self.listener
            .on_current_candidates_change(self.session.candidates().current_page_candidates());
        true
    }

    /// Next candidate page, wrapping to the first one.
    pub fn next_page(&mut self) -> bool {
        if !self.session.candidates_mut().page_down() {
            return false;
        }
        self.listener
            .on_current_candidates_change(self.session.candidates().current_page_candidates());
        true
    }

    /// Backspace.
    ///
    /// With several keys in INPUT the last key is dropped and the rest is
    /// typed again from a clean session, so candidates come from a fresh
    /// lookup. One key, or SELECTING, resets. Nothing to delete leaves the
    /// key to the application.
    ///
    /// A failed lookup during the replay does not stop it; every remaining
    /// key is typed and the first error is returned afterwards.
    pub fn delete_backward(&mut self) -> Result<KeyResult, TableError> {
        if !self.session.is_enabled() {
            return Ok(KeyResult::NotHandled);
        }
        match self.session.status() {
            Status::Selecting => {
                self.reset();
                Ok(KeyResult::Handled)
            }
            Status::Input => match self.session.key_count() {
                0 => Ok(KeyResult::NotHandled),
                1 => {
                    self.reset();
                    Ok(KeyResult::Handled)
                }
                _ => {
                    let mut prefix: Vec<char> = self.session.keys().chars().collect();
                    prefix.pop();
                    debug!(keys = prefix.len(), "replaying after backspace");
                    let had_candidates = !self.session.candidates().is_empty();
                    self.clear_session();
                    let mut first_err = None;
                    for key in prefix {
                        if let Err(err) = self.process_key(key) {
                            first_err.get_or_insert(err);
                        }
                    }
                    // The replay starts from an empty list, so it never
                    // reports that the old one went away.
                    if had_candidates && self.session.candidates().is_empty() {
                        self.fire_candidate_change();
                    }
                    match first_err {
                        Some(err) => Err(err),
                        None => Ok(KeyResult::Handled),
                    }
                }
            },
        }
    }

    // ========== Key processing ==========

    /// Process one key, running any table lookup inline.
    ///
    /// A failed lookup is applied as an empty result, so the session stays
    /// consistent, and the error is returned.
    pub fn process_key(&mut self, key: char) -> Result<(), TableError> {
        match self.begin_key(key) {
            KeyStep::Done => Ok(()),
            KeyStep::Lookup(pending) => {
                let result = pending.query();
                self.finish_key(pending, result).map(|_| ())
            }
        }
    }

    /// First phase of key handling.
    pub fn begin_key(&mut self, key: char) -> KeyStep {
        if !self.session.is_enabled() || !self.has_table() {
            debug!(key = ?key, "pass through");
            self.commit(&key.to_string());
            return KeyStep::Done;
        }
        debug!(key = ?key, keys = %self.session.keys(), status = ?self.session.status(), "key");
        match self.session.status() {
            Status::Input => self.begin_input(key),
            Status::Selecting => self.select(key),
        }
    }

    /// Second phase of key handling.
    ///
    /// Returns `Resolution::Stale` without touching the session when the
    /// lookup belongs to an earlier epoch. Otherwise the result is applied;
    /// an error is applied as an empty result and then returned.
    pub fn finish_key(
        &mut self,
        pending: PendingLookup,
        result: Result<Vec<Candidate>, TableError>,
    ) -> Result<Resolution, TableError> {
        if pending.epoch != self.epoch {
            debug!(
                epoch = pending.epoch,
                current = self.epoch,
                "dropping stale lookup"
            );
            return Ok(Resolution::Stale);
        }
        match result {
            Ok(found) => {
                self.resolve_input(pending.step, found);
                Ok(Resolution::Applied)
            }
            Err(err) => {
                warn!(keycode = %pending.query.keycode, error = %err, "table lookup failed");
                self.resolve_input(pending.step, Vec::new());
                Err(err)
            }
        }
    }

    fn classify(&self, key: char) -> KeyClass {
        KeyClass {
            space: key == ' ',
            end: self.policy.is_end_key(key),
            selection: self.policy.selection_index(key),
            keyname: self
                .store
                .as_ref()
                .is_some_and(|s| s.keyname(key).is_some()),
        }
    }

    /// Fixed-length tables terminate once the longest keycode is reached.
    fn reached_fixed_length(&self) -> bool {
        self.policy.space_style == SpaceStyle::FixedLength
            && self.session.key_count() == self.policy.max_key_length
    }

    /// Page slot picked by a selection key.
    fn select_slot(&self, selection: usize) -> usize {
        if self.policy.space_style == SpaceStyle::SelectFirst {
            selection + 1
        } else {
            selection
        }
    }

    fn begin_input(&mut self, key: char) -> KeyStep {
        let class = self.classify(key);
        let previous_keys = self.session.keys().to_string();
        let previous_candidates = self.session.candidates_mut().take();

        let query = if class.keyname {
            self.session.push_key(key);
            if self.policy.displays_matches() || class.end || self.reached_fixed_length() {
                Some(LookupQuery {
                    keycode: self.session.keys().to_string(),
                    quick: true,
                    prefix: self.policy.show_partial_matches && !class.end,
                    max_results: self.policy.max_prefix_results,
                })
            } else {
                None
            }
        } else if class.space && !self.session.keys().is_empty() {
            Some(LookupQuery {
                keycode: self.session.keys().to_string(),
                quick: false,
                prefix: self.policy.show_partial_matches
                    && self.policy.space_style == SpaceStyle::SelectFirst,
                max_results: self.policy.max_prefix_results,
            })
        } else {
            None
        };

        let step = InputStep {
            key,
            class,
            previous_keys,
            previous_candidates,
        };
        let Some(query) = query else {
            self.resolve_input(step, Vec::new());
            return KeyStep::Done;
        };
        let Some(store) = self.store.clone() else {
            self.resolve_input(step, Vec::new());
            return KeyStep::Done;
        };
        self.epoch += 1;
        KeyStep::Lookup(PendingLookup {
            epoch: self.epoch,
            store,
            query,
            step,
        })
    }

    fn resolve_input(&mut self, step: InputStep, found: Vec<Candidate>) {
        let InputStep {
            key,
            class,
            previous_keys,
            previous_candidates,
        } = step;
        self.session.set_candidates(found);

        // A selection key typed over a shown list keeps the preedit.
        if class.selection.is_none() || previous_candidates.is_empty() {
            let keynames = self.keynames();
            self.listener.on_keynames_change(&keynames);
        }

        let mut fired = false;
        if self.policy.displays_matches()
            && !(self.session.candidates().is_empty() && previous_candidates.is_empty())
        {
            self.fire_candidate_change();
            fired = true;
        }

        if class.end || class.space || self.reached_fixed_length() {
            match self.session.candidates().len() {
                0 => {}
                1 => {
                    self.commit_page_slot(0);
                    return;
                }
                _ => {
                    if class.space && self.policy.space_style == SpaceStyle::SelectFirst {
                        self.commit_page_slot(0);
                    } else {
                        self.session.set_status(Status::Selecting);
                        if !fired {
                            self.fire_candidate_change();
                        }
                        self.listener
                            .on_end_key(self.session.candidates().current_page_candidates());
                    }
                    return;
                }
            }
        }

        if let Some(selection) = class.selection {
            if !previous_keys.is_empty() && !previous_candidates.is_empty() {
                self.session.set_keys(previous_keys);
                self.session.set_candidates(previous_candidates);
                self.fire_candidate_change();
                self.commit_page_slot(self.select_slot(selection));
                return;
            }
        }

        if !class.keyname {
            self.commit(&key.to_string());
            return;
        }

        // Tables that list an end key as a keyname but never define it as a
        // keycode: a lone end key is typed literally.
        if class.end && self.session.key_count() == 1 {
            self.commit(&key.to_string());
        }
    }

    fn select(&mut self, key: char) -> KeyStep {
        let class = self.classify(key);
        if let Some(selection) = class.selection {
            self.commit_page_slot(self.select_slot(selection));
            return KeyStep::Done;
        }
        if class.space {
            if self.session.candidates().num_pages() > 1 {
                self.next_page();
            } else {
                self.commit_page_slot(0);
            }
            return KeyStep::Done;
        }
        self.commit_page_slot(0);
        self.begin_input(key)
    }

    /// Commit a candidate of the current page; out of range is a no-op.
    fn commit_page_slot(&mut self, slot: usize) {
        let Some(text) = self
            .session
            .candidates()
            .page_candidate(slot)
            .map(|c| c.text.clone())
        else {
            debug!(slot, "selection out of range");
            return;
        };
        self.commit(&text);
    }

    fn commit(&mut self, text: &str) {
        debug!(text, "commit");
        self.clear_session();
        self.listener.on_keynames_change("");
        self.fire_candidate_change();
        self.listener.on_commit(text);
    }

    fn fire_candidate_change(&mut self) {
        self.session.candidates_mut().rewind();
        let list = self.session.candidates();
        self.listener
            .on_current_candidates_change(list.current_page_candidates());
        self.listener.on_candidates_change(list.candidates());
    }
}
