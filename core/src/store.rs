//! Table store abstraction.
//!
//! A `TableStore` answers the two queries the composition engine needs:
//! - `lookup_quick`: exact match against the `%quick` section
//! - `lookup_chardef`: exact or prefix match against the `%chardef` section
//!
//! Stores are read-only once built and are shared with `Arc`, so the
//! engine (or a caller running lookups on another thread) can query them
//! freely. Two implementations live in this crate: [`crate::FstTable`]
//! (in memory) and [`crate::RedbTable`] (on disk).

use crate::candidate::Candidate;
use crate::error::TableError;
use crate::table::TableSettings;

/// Read-only lookup backend for a loaded keycode table.
pub trait TableStore: Send + Sync {
    /// Whether a table is available. The engine passes keys through while
    /// this is false.
    fn is_loaded(&self) -> bool {
        true
    }

    /// Settings of the loaded table.
    fn settings(&self) -> &TableSettings;

    /// Display label for an input key, `None` when the key is not a keyname.
    fn keyname(&self, key: char) -> Option<&str>;

    /// Exact quick-index match. Each candidate is a single character.
    fn lookup_quick(&self, keycode: &str) -> Result<Vec<Candidate>, TableError>;

    /// Chardef query.
    ///
    /// With `prefix == false` only records whose keycode equals `keycode` are
    /// returned, in definition order. With `prefix == true` the keycode-ordered
    /// index is scanned from `keycode` onwards, taking at most `max_results`
    /// records that start with it; exact matches come first, the rest follow
    /// in definition order.
    fn lookup_chardef(
        &self,
        keycode: &str,
        prefix: bool,
        max_results: usize,
    ) -> Result<Vec<Candidate>, TableError>;
}

/// A chardef record as seen during an index scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScannedRecord {
    pub keycode: String,
    /// Position of the record in the `%chardef` section.
    pub seq: u64,
    pub text: String,
}

/// Order scanned records: exact matches first, then definition order.
pub(crate) fn order_scan(prefix: &str, mut records: Vec<ScannedRecord>) -> Vec<Candidate> {
    records.sort_by_key(|r| (r.keycode != prefix, r.seq));
    records
        .into_iter()
        .map(|r| Candidate {
            keycode: r.keycode,
            text: r.text,
        })
        .collect()
}

/// Split a packed quick entry into single-character candidates.
pub(crate) fn quick_candidates(keycode: &str, packed: &str) -> Vec<Candidate> {
    packed
        .chars()
        .map(|c| Candidate::new(keycode, c.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(keycode: &str, seq: u64, text: &str) -> ScannedRecord {
        ScannedRecord {
            keycode: keycode.into(),
            seq,
            text: text.into(),
        }
    }

    #[test]
    fn exact_matches_lead_then_definition_order() {
        let scanned = vec![
            rec("ab", 5, "x"),
            rec("ab", 9, "y"),
            rec("aba", 7, "z"),
            rec("abb", 2, "w"),
        ];
        let out: Vec<_> = order_scan("ab", scanned)
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(out, vec!["x", "y", "w", "z"]);
    }

    #[test]
    fn quick_entries_split_per_character() {
        let c = quick_candidates("a", "日曰");
        assert_eq!(c, vec![Candidate::new("a", "日"), Candidate::new("a", "曰")]);
    }
}
