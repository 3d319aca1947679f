//! In-memory table store backed by `fst` keycode indexes.
//!
//! Each section gets an `fst::Map` from keycode to a payload slot; the
//! payloads (packed quick candidates, chardef records with their definition
//! sequence) live in a plain vector. Prefix queries stream the chardef map
//! from the keycode's lower bound.
//!
//! A compiled table can be written to a directory and loaded back:
//! - `quick.fst`, `chardef.fst`: keycode indexes
//! - `table.bincode`: settings, keynames and payloads

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ahash::AHashMap;
use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::candidate::Candidate;
use crate::error::TableError;
use crate::loader::load_cin_file;
use crate::store::{order_scan, quick_candidates, ScannedRecord, TableStore};
use crate::table::{CinTable, TableSettings};

const QUICK_FST: &str = "quick.fst";
const CHARDEF_FST: &str = "chardef.fst";
const PAYLOAD_BINCODE: &str = "table.bincode";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Payload {
    settings: TableSettings,
    keynames: AHashMap<String, String>,
    /// slot -> packed quick candidates
    quick: Vec<String>,
    /// slot -> (definition sequence, candidate), in definition order
    chardef: Vec<Vec<(u64, String)>>,
}

/// Compiled, immutable table held in memory.
pub struct FstTable {
    quick_index: Map<Vec<u8>>,
    chardef_index: Map<Vec<u8>>,
    payload: Payload,
}

impl fmt::Debug for FstTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FstTable")
            .field("ename", &self.payload.settings.ename)
            .field("quick_keycodes", &self.quick_index.len())
            .field("chardef_keycodes", &self.chardef_index.len())
            .finish()
    }
}

impl FstTable {
    /// Compile a loaded table.
    ///
    /// A keycode repeated in `%quick` keeps its first definition.
    pub fn from_table(table: &CinTable) -> Result<Self, TableError> {
        let mut quick: BTreeMap<&str, &str> = BTreeMap::new();
        for r in &table.quick {
            match quick.entry(r.keycode.as_str()) {
                Entry::Vacant(e) => {
                    e.insert(r.candidates.as_str());
                }
                Entry::Occupied(_) => {
                    warn!(keycode = %r.keycode, "duplicate %quick keycode ignored");
                }
            }
        }

        let mut chardef: BTreeMap<&str, Vec<(u64, String)>> = BTreeMap::new();
        for (seq, r) in table.chardef.iter().enumerate() {
            chardef
                .entry(r.keycode.as_str())
                .or_default()
                .push((seq as u64, r.candidate.clone()));
        }

        let mut builder = MapBuilder::memory();
        for (slot, keycode) in quick.keys().enumerate() {
            builder.insert(keycode, slot as u64)?;
        }
        let quick_index = builder.into_map();

        let mut builder = MapBuilder::memory();
        for (slot, keycode) in chardef.keys().enumerate() {
            builder.insert(keycode, slot as u64)?;
        }
        let chardef_index = builder.into_map();

        Ok(Self {
            quick_index,
            chardef_index,
            payload: Payload {
                settings: table.settings.clone(),
                keynames: table.keynames.clone(),
                quick: quick.into_values().map(str::to_string).collect(),
                chardef: chardef.into_values().collect(),
            },
        })
    }

    /// Parse and compile a CIN file.
    pub fn from_cin_file<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        Self::from_table(&load_cin_file(path)?)
    }

    /// Write the compiled table into `dir` (created if missing).
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), TableError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        fs::write(dir.join(QUICK_FST), self.quick_index.as_fst().as_bytes())?;
        fs::write(dir.join(CHARDEF_FST), self.chardef_index.as_fst().as_bytes())?;
        let writer = BufWriter::new(File::create(dir.join(PAYLOAD_BINCODE))?);
        bincode::serialize_into(writer, &self.payload)?;
        Ok(())
    }

    /// Load a table previously written by [`FstTable::save`].
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, TableError> {
        let dir = dir.as_ref();
        let quick_index = Map::new(fs::read(dir.join(QUICK_FST))?)?;
        let chardef_index = Map::new(fs::read(dir.join(CHARDEF_FST))?)?;
        let reader = BufReader::new(File::open(dir.join(PAYLOAD_BINCODE))?);
        let payload: Payload = bincode::deserialize_from(reader)?;
        info!(
            dir = %dir.display(),
            ename = %payload.settings.ename,
            "loaded compiled table"
        );
        Ok(Self {
            quick_index,
            chardef_index,
            payload,
        })
    }

    /// Number of distinct quick keycodes.
    pub fn quick_len(&self) -> usize {
        self.quick_index.len()
    }

    /// Number of distinct chardef keycodes.
    pub fn chardef_len(&self) -> usize {
        self.chardef_index.len()
    }

    fn chardef_records(&self, slot: u64) -> &[(u64, String)] {
        self.payload
            .chardef
            .get(slot as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl TableStore for FstTable {
    fn settings(&self) -> &TableSettings {
        &self.payload.settings
    }

    fn keyname(&self, key: char) -> Option<&str> {
        let mut buf = [0u8; 4];
        self.payload
            .keynames
            .get(&*key.encode_utf8(&mut buf))
            .map(String::as_str)
    }

    fn lookup_quick(&self, keycode: &str) -> Result<Vec<Candidate>, TableError> {
        Ok(self
            .quick_index
            .get(keycode)
            .and_then(|slot| self.payload.quick.get(slot as usize))
            .map(|packed| quick_candidates(keycode, packed))
            .unwrap_or_default())
    }

    fn lookup_chardef(
        &self,
        keycode: &str,
        prefix: bool,
        max_results: usize,
    ) -> Result<Vec<Candidate>, TableError> {
        if !prefix {
            return Ok(self
                .chardef_index
                .get(keycode)
                .map(|slot| {
                    self.chardef_records(slot)
                        .iter()
                        .map(|(_, text)| Candidate::new(keycode, text.clone()))
                        .collect()
                })
                .unwrap_or_default());
        }

        let mut scanned = Vec::new();
        let mut stream = self.chardef_index.range().ge(keycode).into_stream();
        'scan: while let Some((key, slot)) = stream.next() {
            if !key.starts_with(keycode.as_bytes()) {
                break;
            }
            let key = String::from_utf8_lossy(key).into_owned();
            for (seq, text) in self.chardef_records(slot) {
                if scanned.len() >= max_results {
                    break 'scan;
                }
                scanned.push(ScannedRecord {
                    keycode: key.clone(),
                    seq: *seq,
                    text: text.clone(),
                });
            }
        }
        Ok(order_scan(keycode, scanned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_cin_str;

    const TABLE: &str = "\
%keyname begin
a 日
b 月
c 金
%keyname end
%quick begin
a 日曰
%quick end
%chardef begin
abc 萌
ab 明
a 日
ab 朋
a 曰
b 月
%chardef end
";

    fn texts(c: Vec<Candidate>) -> Vec<String> {
        c.into_iter().map(|c| c.text).collect()
    }

    #[test]
    fn quick_exact_match_only() {
        let t = FstTable::from_table(&parse_cin_str(TABLE)).unwrap();
        assert_eq!(texts(t.lookup_quick("a").unwrap()), vec!["日", "曰"]);
        assert!(t.lookup_quick("ab").unwrap().is_empty());
    }

    #[test]
    fn chardef_exact_in_definition_order() {
        let t = FstTable::from_table(&parse_cin_str(TABLE)).unwrap();
        assert_eq!(texts(t.lookup_chardef("ab", false, 120).unwrap()), vec!["明", "朋"]);
        assert!(t.lookup_chardef("zz", false, 120).unwrap().is_empty());
    }

    #[test]
    fn chardef_prefix_puts_exact_first() {
        let t = FstTable::from_table(&parse_cin_str(TABLE)).unwrap();
        let got = t.lookup_chardef("a", true, 120).unwrap();
        assert_eq!(texts(got.clone()), vec!["日", "曰", "萌", "明", "朋"]);
        assert_eq!(got[2].keycode, "abc");
    }

    #[test]
    fn chardef_prefix_respects_cap() {
        let t = FstTable::from_table(&parse_cin_str(TABLE)).unwrap();
        // scan order is a, a, ab, ab, abc; the cap cuts after three records
        let got = t.lookup_chardef("a", true, 3).unwrap();
        assert_eq!(texts(got), vec!["日", "曰", "明"]);
    }

    #[test]
    fn keynames_resolve() {
        let t = FstTable::from_table(&parse_cin_str(TABLE)).unwrap();
        assert_eq!(t.keyname('a'), Some("日"));
        assert_eq!(t.keyname('z'), None);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let t = FstTable::from_table(&parse_cin_str(TABLE)).unwrap();
        t.save(dir.path()).unwrap();
        let loaded = FstTable::load(dir.path()).unwrap();
        assert_eq!(loaded.quick_len(), 1);
        assert_eq!(loaded.chardef_len(), 4);
        assert_eq!(
            texts(loaded.lookup_chardef("a", true, 120).unwrap()),
            texts(t.lookup_chardef("a", true, 120).unwrap())
        );
    }

    #[test]
    fn duplicate_quick_keeps_first() {
        let t = FstTable::from_table(&parse_cin_str(
            "%quick begin\na 日\na 曰\n%quick end\n",
        ))
        .unwrap();
        assert_eq!(texts(t.lookup_quick("a").unwrap()), vec!["日"]);
    }
}
