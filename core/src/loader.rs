//! CIN table loader.
//!
//! Parses the line-oriented CIN format into a [`CinTable`]:
//!
//! ```text
//! %gen_inp
//! %ename  Cangjie
//! %selkey 1234567890
//! %keyname begin
//! a 日
//! %keyname end
//! %chardef begin
//! a 日
//! a 曰
//! %chardef end
//! ```
//!
//! Header lines lose everything from `#` onwards. Section lines are taken
//! verbatim, so `#` can appear as a keycode or candidate there; the line
//! ` # X` defines keycode `#` itself.
//!
//! Output contract (relied on by the engine):
//! - keycodes and keyname keys are lowercased unless `%keep_key_case`
//! - `duplicate_selection_count` falls back to the selkey length when unset or invalid
//! - `space_style` falls back to 4 when not one of 1, 2, 4
//! - `max_key_length` is the longest keycode in `%quick` and `%chardef`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use tracing::{info, warn};

use crate::error::TableError;
use crate::table::{CharDefRecord, CinTable, QuickRecord, SpaceStyle, TableSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Keyname,
    Quick,
    CharDef,
}

/// Load and parse a CIN file from disk.
pub fn load_cin_file<P: AsRef<Path>>(path: P) -> Result<CinTable, TableError> {
    let file = File::open(path.as_ref())?;
    let table = parse_cin(BufReader::new(file))?;
    info!(
        path = %path.as_ref().display(),
        ename = %table.settings.ename,
        quick = table.quick.len(),
        chardef = table.chardef.len(),
        "loaded cin table"
    );
    Ok(table)
}

/// Parse CIN text held in memory.
pub fn parse_cin_str(text: &str) -> CinTable {
    let mut parser = CinParser::new();
    for line in text.lines() {
        parser.feed(line);
    }
    parser.finish()
}

/// Parse CIN text from any buffered reader.
///
/// Fails only on I/O errors (including invalid UTF-8); malformed lines are
/// skipped the same way other CIN consumers skip them.
pub fn parse_cin<R: BufRead>(reader: R) -> Result<CinTable, TableError> {
    let mut parser = CinParser::new();
    for line in reader.lines() {
        parser.feed(&line?);
    }
    Ok(parser.finish())
}

struct CinParser {
    section: Section,
    settings: TableSettings,
    /// Declared `%dupsel`, or `None` when absent or not a number.
    dupsel: Option<i64>,
    dupsel_declared: bool,
    keynames: Vec<(String, String)>,
    quick: Vec<QuickRecord>,
    chardef: Vec<CharDefRecord>,
    first_line: bool,
}

impl CinParser {
    fn new() -> Self {
        Self {
            section: Section::Header,
            settings: TableSettings::default(),
            dupsel: None,
            dupsel_declared: false,
            keynames: Vec::new(),
            quick: Vec::new(),
            chardef: Vec::new(),
            first_line: true,
        }
    }

    fn feed(&mut self, raw: &str) {
        let mut line: String = raw.chars().filter(|&c| c != '\r').collect();
        if self.first_line {
            self.first_line = false;
            if let Some(rest) = line.strip_prefix('\u{feff}') {
                line = rest.to_string();
            }
        }
        if line.is_empty() {
            return;
        }

        match self.section {
            Section::Header => self.header_line(&line),
            Section::Keyname => {
                if line.starts_with("%keyname end") {
                    self.section = Section::Header;
                } else if let Some((key, value)) = split_section_line(&line, false) {
                    self.set_keyname(key, value);
                }
            }
            Section::Quick => {
                if line.starts_with("%quick end") {
                    self.section = Section::Header;
                } else if let Some((keycode, candidates)) = split_section_line(&line, true) {
                    if keycode != "#" || !line.starts_with(" # ") {
                        self.observe_key_length(&keycode);
                    }
                    self.quick.push(QuickRecord {
                        keycode,
                        candidates,
                    });
                }
            }
            Section::CharDef => {
                if line.starts_with("%chardef end") {
                    self.section = Section::Header;
                } else if let Some((keycode, candidate)) = split_section_line(&line, true) {
                    if keycode != "#" || !line.starts_with(" # ") {
                        self.observe_key_length(&keycode);
                    }
                    self.chardef.push(CharDefRecord { keycode, candidate });
                }
            }
        }
    }

    fn header_line(&mut self, line: &str) {
        let line = strip_comment(line);
        if line.is_empty() {
            return;
        }
        let s = &mut self.settings;

        if line.starts_with("%gen_inp") {
            // general input module marker, nothing to record
        } else if let Some(v) = line.strip_prefix("%ename ") {
            s.ename = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("%cname ") {
            s.cname = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("%prompt ") {
            s.prompt = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("%selkey ") {
            s.selection_keys = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("%dupsel ") {
            self.dupsel_declared = true;
            self.dupsel = parse_leading_int(v);
        } else if let Some(v) = line.strip_prefix("%endkey ") {
            s.end_keys = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("%space_style ") {
            s.space_style = match parse_leading_int(v).and_then(SpaceStyle::from_code) {
                Some(style) => style,
                None => {
                    warn!(value = v.trim(), "unsupported %space_style, using 4");
                    SpaceStyle::Standard
                }
            };
        } else if line.starts_with("%keep_key_case") {
            s.keep_key_case = true;
        } else if line.starts_with("%symbol_kbm") {
            s.symbol_kbm = true;
        } else if line.starts_with("%phase_auto_skip_endkey") {
            s.phase_auto_skip_end_key = true;
        } else if line.starts_with("%flag_auto_select_by_phrase") {
            s.auto_select_by_phrase = true;
        } else if line.starts_with("%flag_disp_partial_match") {
            s.disp_partial_match = true;
        } else if line.starts_with("%flag_disp_full_match") {
            s.disp_full_match = true;
        } else if line.starts_with("%flag_vertical_selection") {
            s.vertical_selection = true;
        } else if line.starts_with("%flag_press_full_auto_send") {
            s.press_full_auto_send = true;
        } else if line.starts_with("%flag_unique_auto_send") {
            s.unique_auto_send = true;
        } else if line.starts_with("%keyname begin") {
            self.keynames.clear();
            self.section = Section::Keyname;
        } else if line.starts_with("%quick begin") {
            self.quick.clear();
            self.section = Section::Quick;
        } else if line.starts_with("%chardef begin") {
            self.chardef.clear();
            self.section = Section::CharDef;
        }
    }

    /// Redefinition keeps the key's original position and replaces its label.
    fn set_keyname(&mut self, key: String, label: String) {
        if let Some(slot) = self.keynames.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = label;
        } else {
            self.keynames.push((key, label));
        }
    }

    fn observe_key_length(&mut self, keycode: &str) {
        let len = keycode.chars().count();
        if len > self.settings.max_key_length {
            self.settings.max_key_length = len;
        }
    }

    fn finish(self) -> CinTable {
        let mut settings = self.settings;

        let selkey_len = settings.selection_keys.chars().count();
        settings.duplicate_selection_count = match self.dupsel {
            Some(n) if n >= 1 => usize::try_from(n).unwrap_or(selkey_len),
            _ => {
                if self.dupsel_declared {
                    warn!(fallback = selkey_len, "invalid %dupsel, using selkey length");
                }
                selkey_len
            }
        }
        .max(1);

        let fold = !settings.keep_key_case;
        let mut keynames = AHashMap::with_capacity(self.keynames.len());
        for (key, label) in self.keynames {
            let key = if fold { key.to_lowercase() } else { key };
            keynames.insert(key, label);
        }

        let mut quick = self.quick;
        let mut chardef = self.chardef;
        if fold {
            for r in quick.iter_mut() {
                r.keycode = r.keycode.to_lowercase();
            }
            for r in chardef.iter_mut() {
                r.keycode = r.keycode.to_lowercase();
            }
        }

        CinTable {
            settings,
            keynames,
            quick,
            chardef,
        }
    }
}

/// Drop a trailing `#` comment from a header line.
fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => line[..i].trim(),
        None => line,
    }
}

/// Split a section line into `(key, value)`.
///
/// The key ends at the first space or tab; the value is the remainder. The
/// special form ` # X` yields key `#`. Returns `None` for lines with no
/// separator, a leading separator, or an empty value.
fn split_section_line(line: &str, trim_special: bool) -> Option<(String, String)> {
    if line.len() > 3 {
        if let Some(rest) = line.strip_prefix(" # ") {
            let value = if trim_special { rest.trim() } else { rest };
            if value.is_empty() {
                return None;
            }
            return Some(("#".to_string(), value.to_string()));
        }
    }

    let idx = line.find([' ', '\t'])?;
    if idx == 0 || idx >= line.len() - 1 {
        return None;
    }
    let value = line[idx + 1..].trim();
    if value.is_empty() {
        return None;
    }
    Some((line[..idx].to_string(), value.to_string()))
}

/// Integer prefix of `s`, after leading whitespace and an optional sign.
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}
