//! Keycode table model.
//!
//! A `CinTable` is the output contract of the CIN loader and the input of
//! every table store. It holds:
//! - `TableSettings`: the scalar `%` directives (selection keys, space style, ...)
//! - the keyname map (input key -> display label)
//! - the quick and chardef sections, in file order
//!
//! Tables are built once and treated as immutable afterwards; stores index
//! them for lookup but never change them.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Default `%selkey` when a table does not declare one.
pub const DEFAULT_SELECTION_KEYS: &str = "1234567890";

/// Upper bound on records scanned by a chardef prefix query.
pub const DEFAULT_MAX_PREFIX_RESULTS: usize = 120;

/// How the space bar behaves while composing.
///
/// The numeric codes match the `%space_style` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum SpaceStyle {
    /// 1: space commits the first candidate; the first page slot is reserved
    /// for it (dayi, noseeing).
    SelectFirst,
    /// 2: reaching the longest keycode triggers the lookup (simplex).
    FixedLength,
    /// 4: space behaves like an end key (cangjie, array).
    Standard,
}

impl SpaceStyle {
    /// Numeric code as written in a CIN file.
    pub fn code(self) -> i64 {
        match self {
            SpaceStyle::SelectFirst => 1,
            SpaceStyle::FixedLength => 2,
            SpaceStyle::Standard => 4,
        }
    }

    /// Parse a directive value, returning `None` for anything but 1, 2 or 4.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(SpaceStyle::SelectFirst),
            2 => Some(SpaceStyle::FixedLength),
            4 => Some(SpaceStyle::Standard),
            _ => None,
        }
    }
}

impl Default for SpaceStyle {
    fn default() -> Self {
        Self::Standard
    }
}

impl From<i64> for SpaceStyle {
    fn from(code: i64) -> Self {
        Self::from_code(code).unwrap_or_default()
    }
}

impl From<SpaceStyle> for i64 {
    fn from(style: SpaceStyle) -> Self {
        style.code()
    }
}

/// Scalar settings declared by `%` directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSettings {
    pub ename: String,
    pub cname: String,
    pub prompt: String,

    /// Keys used to pick a candidate from the current page, in slot order.
    pub selection_keys: String,
    /// Candidates per page (before the space-style slot). Always >= 1.
    pub duplicate_selection_count: usize,
    /// Keys that force an immediate lookup.
    pub end_keys: String,
    pub space_style: SpaceStyle,
    pub keep_key_case: bool,

    /// Compute candidates while keys accumulate, including prefix matches.
    pub disp_partial_match: bool,
    /// Compute candidates while keys accumulate, exact matches only.
    pub disp_full_match: bool,
    /// Layout hint for candidate windows; no effect on composition.
    pub vertical_selection: bool,

    // Recognised but without behaviour in this engine.
    pub symbol_kbm: bool,
    pub phase_auto_skip_end_key: bool,
    pub auto_select_by_phrase: bool,
    pub press_full_auto_send: bool,
    pub unique_auto_send: bool,

    /// Longest keycode in the quick and chardef sections.
    pub max_key_length: usize,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            ename: String::new(),
            cname: String::new(),
            prompt: String::new(),
            selection_keys: DEFAULT_SELECTION_KEYS.to_string(),
            duplicate_selection_count: DEFAULT_SELECTION_KEYS.chars().count(),
            end_keys: String::new(),
            space_style: SpaceStyle::Standard,
            keep_key_case: false,
            disp_partial_match: false,
            disp_full_match: false,
            vertical_selection: false,
            symbol_kbm: false,
            phase_auto_skip_end_key: false,
            auto_select_by_phrase: false,
            press_full_auto_send: false,
            unique_auto_send: false,
            max_key_length: 1,
        }
    }
}

/// One line of the `%quick` section: a keycode and its candidate characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickRecord {
    pub keycode: String,
    /// Candidates packed into one string, one candidate per character.
    pub candidates: String,
}

/// One line of the `%chardef` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharDefRecord {
    pub keycode: String,
    pub candidate: String,
}

/// A fully loaded keycode table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CinTable {
    pub settings: TableSettings,
    pub keynames: AHashMap<String, String>,
    pub quick: Vec<QuickRecord>,
    pub chardef: Vec<CharDefRecord>,
}

impl CinTable {
    /// Display label for a single input key.
    pub fn keyname(&self, key: char) -> Option<&str> {
        let mut buf = [0u8; 4];
        self.keynames.get(&*key.encode_utf8(&mut buf)).map(String::as_str)
    }

    /// Number of distinct chardef keycodes.
    pub fn chardef_keycodes(&self) -> usize {
        let mut codes: Vec<&str> = self.chardef.iter().map(|r| r.keycode.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        codes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_style_codes() {
        assert_eq!(SpaceStyle::from_code(1), Some(SpaceStyle::SelectFirst));
        assert_eq!(SpaceStyle::from_code(2), Some(SpaceStyle::FixedLength));
        assert_eq!(SpaceStyle::from_code(4), Some(SpaceStyle::Standard));
        assert_eq!(SpaceStyle::from_code(3), None);
        assert_eq!(SpaceStyle::from(0), SpaceStyle::Standard);
        assert_eq!(i64::from(SpaceStyle::FixedLength), 2);
    }

    #[test]
    fn default_settings_page_size_follows_selkey() {
        let s = TableSettings::default();
        assert_eq!(s.selection_keys, "1234567890");
        assert_eq!(s.duplicate_selection_count, 10);
        assert_eq!(s.space_style, SpaceStyle::Standard);
        assert_eq!(s.max_key_length, 1);
    }

    #[test]
    fn keyname_lookup_by_char() {
        let mut t = CinTable::default();
        t.keynames.insert("a".into(), "日".into());
        assert_eq!(t.keyname('a'), Some("日"));
        assert_eq!(t.keyname('b'), None);
    }

    #[test]
    fn chardef_keycodes_counts_distinct() {
        let mut t = CinTable::default();
        for (k, c) in [("a", "日"), ("a", "曰"), ("b", "月")] {
            t.chardef.push(CharDefRecord {
                keycode: k.into(),
                candidate: c.into(),
            });
        }
        assert_eq!(t.chardef_keycodes(), 2);
    }
}
