//! Effective composition policy.
//!
//! A table declares its own behaviour through `%` directives; an install can
//! override part of it through [`Config`]. `Policy::resolve` merges the two
//! once, so the engine never consults either source while composing.

use serde::{Deserialize, Serialize};

use crate::table::{SpaceStyle, TableSettings};
use crate::Config;

/// Tri-state override for a boolean table flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Override {
    /// Use whatever the table declares.
    #[default]
    FollowTable,
    Yes,
    No,
}

impl Override {
    /// Apply the override to the table's own value.
    pub fn apply(self, table_value: bool) -> bool {
        match self {
            Override::FollowTable => table_value,
            Override::Yes => true,
            Override::No => false,
        }
    }
}

/// Settings the engine composes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub selection_keys: Vec<char>,
    pub end_keys: Vec<char>,
    pub space_style: SpaceStyle,
    /// Candidates per page: `%dupsel`, plus one slot with `SelectFirst`.
    pub page_size: usize,
    pub max_key_length: usize,
    pub show_partial_matches: bool,
    pub show_full_matches: bool,
    pub vertical_selection: bool,
    pub max_prefix_results: usize,
}

impl Policy {
    pub fn resolve(settings: &TableSettings, config: &Config) -> Self {
        let space_style = match config.space_style {
            None | Some(0) => settings.space_style,
            Some(code) => SpaceStyle::from_code(code).unwrap_or_else(|| {
                tracing::warn!(code, "unknown space_style override, following table");
                settings.space_style
            }),
        };
        let mut page_size = settings.duplicate_selection_count.max(1);
        if space_style == SpaceStyle::SelectFirst {
            page_size += 1;
        }
        Self {
            selection_keys: settings.selection_keys.chars().collect(),
            end_keys: settings.end_keys.chars().collect(),
            space_style,
            page_size,
            max_key_length: settings.max_key_length,
            show_partial_matches: config.disp_partial_match.apply(settings.disp_partial_match),
            show_full_matches: config.disp_full_match.apply(settings.disp_full_match),
            vertical_selection: config.vertical_selection.apply(settings.vertical_selection),
            max_prefix_results: config.max_prefix_results.max(1),
        }
    }

    pub fn is_end_key(&self, key: char) -> bool {
        self.end_keys.contains(&key)
    }

    /// Slot of `key` among the selection keys.
    pub fn selection_index(&self, key: char) -> Option<usize> {
        self.selection_keys.iter().position(|&c| c == key)
    }

    /// Whether candidates are computed while keys accumulate.
    pub fn displays_matches(&self) -> bool {
        self.show_full_matches || self.show_partial_matches
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::resolve(&TableSettings::default(), &Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_table_by_default() {
        let settings = TableSettings {
            disp_full_match: true,
            duplicate_selection_count: 4,
            ..TableSettings::default()
        };
        let p = Policy::resolve(&settings, &Config::default());
        assert!(p.show_full_matches);
        assert!(!p.show_partial_matches);
        assert_eq!(p.page_size, 4);
        assert_eq!(p.space_style, SpaceStyle::Standard);
        assert_eq!(p.max_prefix_results, 120);
    }

    #[test]
    fn select_first_adds_a_page_slot() {
        let settings = TableSettings {
            space_style: SpaceStyle::SelectFirst,
            duplicate_selection_count: 9,
            ..TableSettings::default()
        };
        assert_eq!(Policy::resolve(&settings, &Config::default()).page_size, 10);
    }

    #[test]
    fn config_overrides_win() {
        let settings = TableSettings {
            disp_full_match: true,
            ..TableSettings::default()
        };
        let config = Config {
            space_style: Some(2),
            disp_full_match: Override::No,
            disp_partial_match: Override::Yes,
            vertical_selection: Override::Yes,
            ..Config::default()
        };
        let p = Policy::resolve(&settings, &config);
        assert_eq!(p.space_style, SpaceStyle::FixedLength);
        assert!(!p.show_full_matches);
        assert!(p.show_partial_matches);
        assert!(p.vertical_selection);
    }

    #[test]
    fn zero_or_unknown_space_style_follows_table() {
        let settings = TableSettings {
            space_style: SpaceStyle::SelectFirst,
            ..TableSettings::default()
        };
        for code in [0, 3] {
            let config = Config {
                space_style: Some(code),
                ..Config::default()
            };
            assert_eq!(
                Policy::resolve(&settings, &config).space_style,
                SpaceStyle::SelectFirst
            );
        }
    }

    #[test]
    fn key_classification() {
        let settings = TableSettings {
            selection_keys: "asd".into(),
            end_keys: "'".into(),
            ..TableSettings::default()
        };
        let p = Policy::resolve(&settings, &Config::default());
        assert_eq!(p.selection_index('s'), Some(1));
        assert_eq!(p.selection_index('1'), None);
        assert!(p.is_end_key('\''));
        assert!(!p.is_end_key('a'));
    }
}
