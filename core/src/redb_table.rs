//! Redb-backed persistent table store.
//!
//! Layout:
//! - `settings`: `"settings"` -> bincode-encoded [`TableSettings`]
//! - `keyname`: key -> display label
//! - `quick`: keycode -> packed candidates
//! - `chardef`: (keycode, definition sequence) -> candidate
//!
//! The composite chardef key keeps records ordered by keycode and then by
//! definition order, so exact lookups and prefix scans are plain range reads.
//! Settings and keynames are read once when the database is opened; chardef
//! answers are memoised in an LRU cache.
//!
//! [`RedbTable::import`] is the only writer: it drops every table and
//! rewrites the whole table in one transaction.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ahash::AHashMap;
use lru::LruCache;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info, warn};

use crate::candidate::Candidate;
use crate::error::{storage, TableError};
use crate::store::{order_scan, quick_candidates, ScannedRecord, TableStore};
use crate::table::{CinTable, TableSettings};

const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");
const KEYNAME: TableDefinition<&str, &str> = TableDefinition::new("keyname");
const QUICK: TableDefinition<&str, &str> = TableDefinition::new("quick");
const CHARDEF: TableDefinition<(&str, u64), &str> = TableDefinition::new("chardef");

const SETTINGS_KEY: &str = "settings";

type CacheKey = (String, bool, usize);

struct Header {
    settings: TableSettings,
    keynames: AHashMap<String, String>,
}

/// Persistent table store.
pub struct RedbTable {
    db: Database,
    path: PathBuf,
    header: Option<Header>,
    /// Returned by `settings()` while nothing is imported.
    empty_settings: TableSettings,
    cache: Mutex<LruCache<CacheKey, Vec<Candidate>>>,
}

impl fmt::Debug for RedbTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbTable")
            .field("path", &self.path)
            .field("loaded", &self.header.is_some())
            .finish()
    }
}

impl RedbTable {
    /// Create or open a table database at `path`.
    ///
    /// `cache_size` bounds the number of memoised chardef queries (0 is
    /// treated as 1).
    pub fn open<P: AsRef<Path>>(path: P, cache_size: usize) -> Result<Self, TableError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(storage)?;
        let header = read_header(&db)?;
        if header.is_none() {
            debug!(path = %path.display(), "table database has no imported table");
        }
        Ok(Self {
            db,
            path: path.to_path_buf(),
            header,
            empty_settings: TableSettings::default(),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN),
            )),
        })
    }

    /// Replace the stored table with `table` in a single write transaction.
    pub fn import(&mut self, table: &CinTable) -> Result<(), TableError> {
        let txn = self.db.begin_write().map_err(storage)?;
        txn.delete_table(SETTINGS).map_err(storage)?;
        txn.delete_table(KEYNAME).map_err(storage)?;
        txn.delete_table(QUICK).map_err(storage)?;
        txn.delete_table(CHARDEF).map_err(storage)?;
        {
            let encoded = bincode::serialize(&table.settings)?;
            let mut t = txn.open_table(SETTINGS).map_err(storage)?;
            t.insert(SETTINGS_KEY, encoded.as_slice()).map_err(storage)?;

            let mut t = txn.open_table(KEYNAME).map_err(storage)?;
            for (key, label) in &table.keynames {
                t.insert(key.as_str(), label.as_str()).map_err(storage)?;
            }

            let mut t = txn.open_table(QUICK).map_err(storage)?;
            for r in &table.quick {
                let exists = t.get(r.keycode.as_str()).map_err(storage)?.is_some();
                if exists {
                    warn!(keycode = %r.keycode, "duplicate %quick keycode ignored");
                    continue;
                }
                t.insert(r.keycode.as_str(), r.candidates.as_str())
                    .map_err(storage)?;
            }

            let mut t = txn.open_table(CHARDEF).map_err(storage)?;
            for (seq, r) in table.chardef.iter().enumerate() {
                t.insert((r.keycode.as_str(), seq as u64), r.candidate.as_str())
                    .map_err(storage)?;
            }
        }
        txn.commit().map_err(storage)?;

        self.header = Some(Header {
            settings: table.settings.clone(),
            keynames: table.keynames.clone(),
        });
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        info!(
            path = %self.path.display(),
            ename = %table.settings.ename,
            chardef = table.chardef.len(),
            "imported table"
        );
        Ok(())
    }

    /// Database location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cached(&self, key: &CacheKey) -> Option<Vec<Candidate>> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    fn remember(&self, key: CacheKey, value: &[Candidate]) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, value.to_vec());
        }
    }

    fn scan_chardef(
        &self,
        keycode: &str,
        prefix: bool,
        max_results: usize,
    ) -> Result<Vec<Candidate>, TableError> {
        let txn = self.db.begin_read().map_err(storage)?;
        let table = txn.open_table(CHARDEF).map_err(storage)?;

        if !prefix {
            let mut out = Vec::new();
            for item in table
                .range((keycode, 0u64)..=(keycode, u64::MAX))
                .map_err(storage)?
            {
                let (_, value) = item.map_err(storage)?;
                out.push(Candidate::new(keycode, value.value()));
            }
            return Ok(out);
        }

        let mut scanned = Vec::new();
        for item in table.range((keycode, 0u64)..).map_err(storage)? {
            let (key, value) = item.map_err(storage)?;
            let (code, seq) = key.value();
            if !code.starts_with(keycode) || scanned.len() >= max_results {
                break;
            }
            scanned.push(ScannedRecord {
                keycode: code.to_string(),
                seq,
                text: value.value().to_string(),
            });
        }
        Ok(order_scan(keycode, scanned))
    }
}

fn read_header(db: &Database) -> Result<Option<Header>, TableError> {
    let txn = db.begin_read().map_err(storage)?;
    let settings_table = match txn.open_table(SETTINGS) {
        Ok(t) => t,
        Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(e) => return Err(storage(e)),
    };
    let settings: TableSettings = match settings_table.get(SETTINGS_KEY).map_err(storage)? {
        Some(raw) => bincode::deserialize(raw.value())?,
        None => return Ok(None),
    };

    let mut keynames = AHashMap::new();
    match txn.open_table(KEYNAME) {
        Ok(t) => {
            for item in t.iter().map_err(storage)? {
                let (k, v) = item.map_err(storage)?;
                keynames.insert(k.value().to_string(), v.value().to_string());
            }
        }
        Err(redb::TableError::TableDoesNotExist(_)) => {}
        Err(e) => return Err(storage(e)),
    }
    Ok(Some(Header { settings, keynames }))
}

impl TableStore for RedbTable {
    fn is_loaded(&self) -> bool {
        self.header.is_some()
    }

    fn settings(&self) -> &TableSettings {
        self.header
            .as_ref()
            .map(|h| &h.settings)
            .unwrap_or(&self.empty_settings)
    }

    fn keyname(&self, key: char) -> Option<&str> {
        let mut buf = [0u8; 4];
        self.header
            .as_ref()?
            .keynames
            .get(&*key.encode_utf8(&mut buf))
            .map(String::as_str)
    }

    fn lookup_quick(&self, keycode: &str) -> Result<Vec<Candidate>, TableError> {
        if self.header.is_none() {
            return Err(TableError::NotLoaded);
        }
        let txn = self.db.begin_read().map_err(storage)?;
        let table = txn.open_table(QUICK).map_err(storage)?;
        let packed = table.get(keycode).map_err(storage)?;
        Ok(packed
            .map(|p| quick_candidates(keycode, p.value()))
            .unwrap_or_default())
    }

    fn lookup_chardef(
        &self,
        keycode: &str,
        prefix: bool,
        max_results: usize,
    ) -> Result<Vec<Candidate>, TableError> {
        if self.header.is_none() {
            return Err(TableError::NotLoaded);
        }
        let key = (keycode.to_string(), prefix, max_results);
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }
        let found = self.scan_chardef(keycode, prefix, max_results)?;
        self.remember(key, &found);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_cin_str;

    const TABLE: &str = "\
%ename redb
%keyname begin
a 日
b 月
%keyname end
%quick begin
a 日曰
%quick end
%chardef begin
abc 萌
ab 明
a 日
ab 朋
b 月
%chardef end
";

    fn texts(c: Vec<Candidate>) -> Vec<String> {
        c.into_iter().map(|c| c.text).collect()
    }

    #[test]
    fn fresh_database_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let t = RedbTable::open(dir.path().join("t.redb"), 16).unwrap();
        assert!(!t.is_loaded());
        assert_eq!(t.keyname('a'), None);
        assert!(matches!(t.lookup_quick("a"), Err(TableError::NotLoaded)));
        assert!(matches!(
            t.lookup_chardef("a", false, 120),
            Err(TableError::NotLoaded)
        ));
    }

    #[test]
    fn import_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = RedbTable::open(dir.path().join("t.redb"), 16).unwrap();
        t.import(&parse_cin_str(TABLE)).unwrap();
        assert!(t.is_loaded());
        assert_eq!(t.settings().ename, "redb");
        assert_eq!(t.keyname('b'), Some("月"));
        assert_eq!(texts(t.lookup_quick("a").unwrap()), vec!["日", "曰"]);
        assert_eq!(texts(t.lookup_chardef("ab", false, 120).unwrap()), vec!["明", "朋"]);
        assert_eq!(
            texts(t.lookup_chardef("a", true, 120).unwrap()),
            vec!["日", "萌", "明", "朋"]
        );
    }

    #[test]
    fn reopen_reads_imported_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.redb");
        {
            let mut t = RedbTable::open(&path, 16).unwrap();
            t.import(&parse_cin_str(TABLE)).unwrap();
        }
        let t = RedbTable::open(&path, 16).unwrap();
        assert!(t.is_loaded());
        assert_eq!(t.keyname('a'), Some("日"));
        assert_eq!(texts(t.lookup_chardef("b", false, 120).unwrap()), vec!["月"]);
    }

    #[test]
    fn reimport_replaces_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = RedbTable::open(dir.path().join("t.redb"), 16).unwrap();
        t.import(&parse_cin_str(TABLE)).unwrap();
        // warm the cache with the old answer
        assert_eq!(texts(t.lookup_chardef("b", false, 120).unwrap()), vec!["月"]);

        t.import(&parse_cin_str(
            "%keyname begin\nb 月\n%keyname end\n%chardef begin\nb 朋\n%chardef end\n",
        ))
        .unwrap();
        assert_eq!(t.keyname('a'), None);
        assert!(t.lookup_quick("a").unwrap().is_empty());
        assert_eq!(texts(t.lookup_chardef("b", false, 120).unwrap()), vec!["朋"]);
    }

    #[test]
    fn prefix_scan_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = RedbTable::open(dir.path().join("t.redb"), 16).unwrap();
        t.import(&parse_cin_str(TABLE)).unwrap();
        assert_eq!(texts(t.lookup_chardef("a", true, 2).unwrap()), vec!["日", "明"]);
    }
}
