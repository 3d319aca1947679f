//! libcin-core
//!
//! Table-driven input method engine for CIN tables (Cangjie, Array, Dayi,
//! Simplex and the like): a CIN loader, two table stores, and the
//! key-composition state machine that turns keystrokes into committed text.
//!
//! Tables are compiled into `fst` keycode indexes with bincode payloads for
//! in-memory use, or imported into a redb database for persistent use.
//!
//! Public API:
//! - `CinTable` / `load_cin_file` - parsed table and the CIN loader
//! - `TableStore` - lookup contract, implemented by `FstTable` and `RedbTable`
//! - `CinEngine` - composition state machine with a two-phase key API
//! - `CompositionListener` / `ImeContext` - change and commit notifications
//! - `Config` / `Policy` - per-install overrides and the resolved policy

use serde::{Deserialize, Serialize};

pub mod table;
pub use table::{CharDefRecord, CinTable, QuickRecord, SpaceStyle, TableSettings};

pub mod error;
pub use error::TableError;

pub mod loader;
pub use loader::{load_cin_file, parse_cin, parse_cin_str};

pub mod candidate;
pub use candidate::{Candidate, CandidateList};

pub mod store;
pub use store::TableStore;

pub mod fst_table;
pub use fst_table::FstTable;

pub mod redb_table;
pub use redb_table::RedbTable;

pub mod policy;
pub use policy::{Override, Policy};

pub mod session;
pub use session::{CompositionSession, Status};

pub mod context;
pub use context::{CompositionEvent, CompositionListener, ImeContext, NullListener};

pub mod engine;
pub use engine::{CinEngine, KeyResult, KeyStep, LookupQuery, PendingLookup, Resolution};

/// Per-install configuration.
///
/// Every field overrides, or bounds, what the loaded table declares. A
/// missing field takes its default, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Space style override: 1, 2 or 4. Absent or 0 follows the table.
    pub space_style: Option<i64>,

    /// Compute exact matches while typing.
    pub disp_full_match: Override,
    /// Compute prefix matches while typing.
    pub disp_partial_match: Override,
    /// Vertical candidate window hint.
    pub vertical_selection: Override,

    /// Upper bound on records scanned by a prefix query.
    pub max_prefix_results: usize,

    // Cache Management
    /// Maximum number of memoised chardef queries in a persistent store
    pub lookup_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            space_style: None,
            disp_full_match: Override::FollowTable,
            disp_partial_match: Override::FollowTable,
            vertical_selection: Override::FollowTable,
            max_prefix_results: table::DEFAULT_MAX_PREFIX_RESULTS,
            lookup_cache_size: 1000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Set the space style override; 0 restores the table's own style.
    pub fn set_space_style(&mut self, code: i64) {
        self.space_style = (code != 0).then_some(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn toml_overrides() {
        let cfg = Config::from_toml_str(
            "space_style = 1\ndisp_full_match = \"yes\"\nvertical_selection = \"no\"\n",
        )
        .unwrap();
        assert_eq!(cfg.space_style, Some(1));
        assert_eq!(cfg.disp_full_match, Override::Yes);
        assert_eq!(cfg.disp_partial_match, Override::FollowTable);
        assert_eq!(cfg.vertical_selection, Override::No);
        assert_eq!(cfg.max_prefix_results, 120);
    }

    #[test]
    fn toml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cin.toml");
        let mut cfg = Config::default();
        cfg.set_space_style(2);
        cfg.disp_partial_match = Override::Yes;
        cfg.save_toml(&path).unwrap();
        assert_eq!(Config::load_toml(&path).unwrap(), cfg);

        cfg.set_space_style(0);
        assert_eq!(cfg.space_style, None);
    }
}
