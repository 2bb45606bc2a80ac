//! Writer for an on-disk database.
//!
//! Records, termlists, positions and values are written straight into
//! their tables. Postings are buffered in an `Inverter` and merged into the
//! postlist table when enough documents have changed or at commit. Nothing
//! is visible to readers until `commit()` writes the base files, postlist
//! table last.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};

use crate::backend::brass::BrassTables;
use crate::backend::{doc_not_found, TermListEntry, ValueStats};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocCount, DocId, Document, Revision, TermCount, ValueSlot};
use crate::index::inverter::Inverter;
use crate::index::metadata::check_metadata_key;
use crate::index::position::{encode_positions, position_key};
use crate::index::posting::CollectionStats;
use crate::index::postlist_table::{read_collection_stats, term_stats, write_collection_stats};
use crate::index::record::record_key;
use crate::index::spelling::{decode_freq, encode_freq, spelling_key};
use crate::index::synonym::{decode_synonyms, encode_synonyms, insert_sorted, synonym_key};
use crate::index::termlist::{termlist_key, StoredTermList};
use crate::index::value::{
    decode_document_values, decode_stats, document_key, encode_document_values, encode_stats,
    stats_key, stream_key,
};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::{DatabaseLayout, TABLE_NAMES};
use crate::storage::table::Table;

pub struct BrassWriter {
    layout: DatabaseLayout,
    config: Config,
    /// Indexed as `TABLE_NAMES`.
    tables: Vec<Table>,
    inverter: Inverter,
    stats: CollectionStats,
    doccount: DocCount,
    total_length: u64,
    value_stats: BTreeMap<ValueSlot, ValueStats>,
    _lock: FileLock,
}

const RECORD: usize = 0;
const TERMLIST: usize = 1;
const POSITION: usize = 2;
const VALUE: usize = 3;
const SPELLING: usize = 4;
const SYNONYM: usize = 5;
const METADATA: usize = 6;
const POSTLIST: usize = 7;

impl BrassWriter {
    /// Create a new empty database, replacing anything already at `path`.
    pub fn create(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        config.validate()?;
        let layout = DatabaseLayout::create(path.as_ref())?;
        let lock = FileLock::acquire(&layout)?;
        let mut tables = Vec::with_capacity(TABLE_NAMES.len());
        for name in TABLE_NAMES {
            tables.push(Table::create(layout.dir(), name, config)?);
        }
        info!("created database {}", layout.dir().display());
        Ok(BrassWriter {
            layout,
            config: config.clone(),
            tables,
            inverter: Inverter::new(),
            stats: CollectionStats::default(),
            doccount: 0,
            total_length: 0,
            value_stats: BTreeMap::new(),
            _lock: lock,
        })
    }

    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        config.validate()?;
        let layout = DatabaseLayout::new(path.as_ref());
        if !layout.is_database() {
            return Err(Error::new(
                ErrorKind::DatabaseOpening,
                format!("no database at {}", layout.dir().display()),
            ));
        }
        let lock = FileLock::acquire(&layout)?;
        let revision = BrassTables::committed_revision(&layout)?;
        let postlist = Table::open(layout.dir(), "postlist", config, Some(revision), true)?;
        let revision = Some(postlist.revision());
        let mut tables = Vec::with_capacity(TABLE_NAMES.len());
        for name in &TABLE_NAMES[..POSTLIST] {
            tables.push(Table::open(layout.dir(), name, config, revision, true)?);
        }
        tables.push(postlist);
        let mut writer = BrassWriter {
            layout,
            config: config.clone(),
            tables,
            inverter: Inverter::new(),
            stats: CollectionStats::default(),
            doccount: 0,
            total_length: 0,
            value_stats: BTreeMap::new(),
            _lock: lock,
        };
        writer.load_stats()?;
        info!(
            "opened database {} for writing at revision {} ({} documents)",
            writer.layout.dir().display(), writer.revision(), writer.doccount
        );
        Ok(writer)
    }

    /// Create the database if `path` doesn't hold one yet.
    pub fn create_or_open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        if DatabaseLayout::new(path.as_ref()).is_database() {
            Self::open(path, config)
        } else {
            Self::create(path, config)
        }
    }

    fn load_stats(&mut self) -> Result<()> {
        self.stats = read_collection_stats(&self.tables[POSTLIST])?;
        let doclens = term_stats(&self.tables[POSTLIST], "")?;
        self.doccount = doclens.termfreq;
        self.total_length = doclens.collfreq;
        self.value_stats.clear();
        Ok(())
    }

    pub fn layout(&self) -> &DatabaseLayout {
        &self.layout
    }

    /// The last committed revision.
    pub fn revision(&self) -> Revision {
        self.tables[POSTLIST].revision()
    }

    pub fn doccount(&self) -> DocCount {
        self.doccount
    }

    pub fn last_docid(&self) -> DocId {
        self.stats.last_docid
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Whether there are changes not yet committed.
    pub fn has_changes(&self) -> bool {
        !self.inverter.is_empty() || self.tables.iter().any(|t| t.is_modified())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        TABLE_NAMES.iter().position(|n| *n == name).map(|i| &self.tables[i])
    }

    fn stored_termlist(&self, did: DocId) -> Result<Option<StoredTermList>> {
        match self.tables[TERMLIST].get(&termlist_key(did))? {
            Some(tag) => Ok(Some(StoredTermList::decode(&tag)?)),
            None => Ok(None),
        }
    }

    fn slot_stats(&mut self, slot: ValueSlot) -> Result<&mut ValueStats> {
        if !self.value_stats.contains_key(&slot) {
            let stats = match self.tables[VALUE].get(&stats_key(slot))? {
                Some(tag) => decode_stats(&tag)?,
                None => ValueStats::default(),
            };
            self.value_stats.insert(slot, stats);
        }
        self.value_stats
            .get_mut(&slot)
            .ok_or_else(|| Error::new(ErrorKind::Internal, "value stats vanished"))
    }

    pub fn add_document(&mut self, doc: &Document) -> Result<DocId> {
        let did = self.stats.last_docid.checked_add(1)
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "run out of docids"))?;
        self.write_document(did, doc, None)?;
        Ok(did)
    }

    /// Replace the document `did`, or add it under that docid if absent.
    pub fn replace_document(&mut self, did: DocId, doc: &Document) -> Result<()> {
        if did == 0 {
            return Err(Error::invalid_argument("docid 0 is invalid"));
        }
        let old = self.stored_termlist(did)?;
        self.write_document(did, doc, old)
    }

    pub fn delete_document(&mut self, did: DocId) -> Result<()> {
        if did == 0 {
            return Err(Error::invalid_argument("docid 0 is invalid"));
        }
        let old = self.stored_termlist(did)?.ok_or_else(|| doc_not_found(did))?;
        self.tables[RECORD].del(&record_key(did))?;
        self.tables[TERMLIST].del(&termlist_key(did))?;
        for entry in &old.entries {
            self.tables[POSITION].del(&position_key(did, &entry.term))?;
        }
        self.remove_values(did)?;
        self.inverter.delete_document(did, &old);
        self.doccount -= 1;
        self.total_length -= old.doclen as u64;
        debug!("deleted document {}", did);
        self.maybe_flush()
    }

    fn write_document(&mut self, did: DocId, doc: &Document, old: Option<StoredTermList>) -> Result<()> {
        let doclen = doc.doclength();
        let mut entries = Vec::with_capacity(doc.termlist_count());
        let mut max_wdf: TermCount = 0;
        for (term, info) in doc.terms() {
            entries.push(TermListEntry { term: term.to_string(), wdf: info.wdf });
            max_wdf = max_wdf.max(info.wdf);
            let key = position_key(did, term);
            if info.positions.is_empty() {
                if old.is_some() {
                    self.tables[POSITION].del(&key)?;
                }
            } else {
                self.tables[POSITION].add(&key, &encode_positions(&info.positions))?;
            }
        }
        let termlist = StoredTermList { doclen, entries };

        self.tables[RECORD].add(&record_key(did), doc.data())?;
        self.tables[TERMLIST].add(&termlist_key(did), &termlist.encode())?;

        match &old {
            Some(old) => {
                for entry in &old.entries {
                    if doc.term(&entry.term).is_none() {
                        self.tables[POSITION].del(&position_key(did, &entry.term))?;
                    }
                }
                self.remove_values(did)?;
                self.inverter.replace_document(did, old, doc);
                self.total_length -= old.doclen as u64;
            }
            None => {
                self.inverter.add_document(did, doc);
                self.doccount += 1;
            }
        }
        self.total_length += doclen as u64;
        self.write_values(did, doc)?;

        if self.doccount == 1 || doclen < self.stats.doclen_lbound {
            self.stats.doclen_lbound = doclen;
        }
        self.stats.doclen_ubound = self.stats.doclen_ubound.max(doclen);
        self.stats.wdf_ubound = self.stats.wdf_ubound.max(max_wdf);
        self.stats.last_docid = self.stats.last_docid.max(did);
        self.maybe_flush()
    }

    fn write_values(&mut self, did: DocId, doc: &Document) -> Result<()> {
        let mut values = BTreeMap::new();
        for (slot, value) in doc.values() {
            self.tables[VALUE].add(&stream_key(slot, did), value)?;
            self.slot_stats(slot)?.add(value);
            values.insert(slot, value.to_vec());
        }
        if !values.is_empty() {
            self.tables[VALUE].add(&document_key(did), &encode_document_values(&values))?;
        }
        Ok(())
    }

    fn remove_values(&mut self, did: DocId) -> Result<()> {
        let Some(tag) = self.tables[VALUE].get(&document_key(did))? else {
            return Ok(());
        };
        for slot in decode_document_values(&tag)?.into_keys() {
            self.tables[VALUE].del(&stream_key(slot, did))?;
            self.slot_stats(slot)?.remove();
        }
        self.tables[VALUE].del(&document_key(did))?;
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.inverter.pending() >= self.config.flush_threshold {
            self.flush_postings()?;
        }
        Ok(())
    }

    fn flush_postings(&mut self) -> Result<()> {
        self.inverter.flush(&mut self.tables[POSTLIST], self.config.postlist_chunk_size)
    }

    /// An empty value removes the entry.
    pub fn set_metadata(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_metadata_key(key)?;
        if value.is_empty() {
            self.tables[METADATA].del(key)?;
        } else {
            self.tables[METADATA].add(key, value)?;
        }
        Ok(())
    }

    pub fn add_spelling(&mut self, word: &str, inc: DocCount) -> Result<()> {
        let key = spelling_key(word)?;
        let freq = match self.tables[SPELLING].get(&key)? {
            Some(tag) => decode_freq(&tag)?,
            None => 0,
        };
        self.tables[SPELLING].add(&key, &encode_freq(freq.saturating_add(inc)))
    }

    /// The word goes once its frequency reaches zero.
    pub fn remove_spelling(&mut self, word: &str, dec: DocCount) -> Result<()> {
        let key = spelling_key(word)?;
        let Some(tag) = self.tables[SPELLING].get(&key)? else {
            return Ok(());
        };
        let freq = decode_freq(&tag)?;
        if freq <= dec {
            self.tables[SPELLING].del(&key)?;
        } else {
            self.tables[SPELLING].add(&key, &encode_freq(freq - dec))?;
        }
        Ok(())
    }

    fn synonym_list(&self, key: &[u8]) -> Result<Vec<String>> {
        match self.tables[SYNONYM].get(key)? {
            Some(tag) => decode_synonyms(&tag),
            None => Ok(Vec::new()),
        }
    }

    pub fn add_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        if synonym.is_empty() {
            return Err(Error::invalid_argument("empty synonym"));
        }
        let key = synonym_key(term)?;
        let mut list = self.synonym_list(&key)?;
        if insert_sorted(&mut list, synonym) {
            self.tables[SYNONYM].add(&key, &encode_synonyms(&list))?;
        }
        Ok(())
    }

    pub fn remove_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        let key = synonym_key(term)?;
        let mut list = self.synonym_list(&key)?;
        let before = list.len();
        list.retain(|s| s != synonym);
        if list.len() == before {
            return Ok(());
        }
        if list.is_empty() {
            self.tables[SYNONYM].del(&key)?;
        } else {
            self.tables[SYNONYM].add(&key, &encode_synonyms(&list))?;
        }
        Ok(())
    }

    pub fn clear_synonyms(&mut self, term: &str) -> Result<()> {
        self.tables[SYNONYM].del(&synonym_key(term)?)?;
        Ok(())
    }

    /// Merge pending postings and commit every table at one new revision.
    pub fn commit(&mut self) -> Result<Revision> {
        self.flush_postings()?;
        let slots: Vec<(ValueSlot, ValueStats)> = std::mem::take(&mut self.value_stats).into_iter().collect();
        for (slot, stats) in slots {
            if stats.freq == 0 {
                self.tables[VALUE].del(&stats_key(slot))?;
            } else {
                self.tables[VALUE].add(&stats_key(slot), &encode_stats(&stats))?;
            }
        }
        write_collection_stats(&mut self.tables[POSTLIST], &self.stats)?;

        let revision = self.tables[POSTLIST].working_revision();
        for table in &mut self.tables {
            table.commit(revision)?;
        }
        info!(
            "committed revision {} of {} ({} documents)",
            revision, self.layout.dir().display(), self.doccount
        );
        Ok(revision)
    }

    /// Drop every change since the last commit.
    pub fn cancel(&mut self) -> Result<()> {
        for table in &mut self.tables {
            table.cancel();
        }
        self.inverter.clear();
        self.load_stats()?;
        debug!("cancelled changes to {}", self.layout.dir().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(terms: &[(&str, TermCount)]) -> Document {
        let mut doc = Document::new();
        for (term, wdf) in terms {
            doc.add_term(term, *wdf).unwrap();
        }
        doc
    }

    #[test]
    fn stats_track_adds_and_deletes() {
        let dir = TempDir::new().unwrap();
        let mut db = BrassWriter::create(dir.path(), &Config::default()).unwrap();
        let a = db.add_document(&doc(&[("cat", 2), ("dog", 1)])).unwrap();
        let b = db.add_document(&doc(&[("cat", 5)])).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(db.total_length(), 8);
        db.delete_document(a).unwrap();
        assert_eq!(db.doccount(), 1);
        assert_eq!(db.total_length(), 5);
        assert!(db.delete_document(a).unwrap_err().is(ErrorKind::DocNotFound));
        let rev = db.commit().unwrap();
        assert_eq!(rev, 1);
        assert_eq!(db.revision(), 1);
        assert!(!db.has_changes());
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let _db = BrassWriter::create(dir.path(), &Config::default()).unwrap();
        let err = BrassWriter::open(dir.path(), &Config::default()).err().unwrap();
        assert!(err.is(ErrorKind::DatabaseLock));
    }

    #[test]
    fn cancel_restores_counts() {
        let dir = TempDir::new().unwrap();
        let mut db = BrassWriter::create(dir.path(), &Config::default()).unwrap();
        db.add_document(&doc(&[("a", 1)])).unwrap();
        db.commit().unwrap();
        db.add_document(&doc(&[("b", 1)])).unwrap();
        db.cancel().unwrap();
        assert_eq!(db.doccount(), 1);
        assert_eq!(db.last_docid(), 1);
        assert!(!db.has_changes());
    }
}
