//! Read-only snapshot of an on-disk database.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::backend::{
    doc_not_found, DatabaseInternal, PositionList, TermCursor, TermListEntry, ValueCursor,
    ValueStats,
};
use crate::compression::vbyte::VByteEncoder;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocCount, DocId, DocTerm, Document, Revision, TermCount, ValueSlot};
use crate::index::metadata::check_metadata_key;
use crate::index::position::{position_key, EncodedPositionList};
use crate::index::posting::{parse_key, CollectionStats, TermStats};
use crate::index::postlist_table::{read_collection_stats, term_stats, BrassPostList, SkipPolicy};
use crate::index::record::record_key;
use crate::index::spelling::{decode_freq, parse_spelling_key, spelling_key, words_prefix};
use crate::index::synonym::{decode_synonyms, synonym_key};
use crate::index::termlist::{termlist_key, StoredTermList};
use crate::index::value::{decode_document_values, decode_stats, document_key, parse_stream_key, stats_key, stream_prefix};
use crate::storage::base::TableBase;
use crate::storage::cursor::TableCursor;
use crate::storage::layout::{DatabaseLayout, TABLE_NAMES};
use crate::storage::table::Table;

/// The eight tables of a database, all at one revision.
#[derive(Debug, Clone)]
pub struct BrassTables {
    pub record: Arc<Table>,
    pub termlist: Arc<Table>,
    pub position: Arc<Table>,
    pub value: Arc<Table>,
    pub spelling: Arc<Table>,
    pub synonym: Arc<Table>,
    pub metadata: Arc<Table>,
    pub postlist: Arc<Table>,
}

impl BrassTables {
    pub fn open(layout: &DatabaseLayout, config: &Config, revision: Option<Revision>) -> Result<Self> {
        if !layout.is_database() {
            return Err(Error::new(
                ErrorKind::DatabaseOpening,
                format!("no database at {}", layout.dir().display()),
            ));
        }
        let dir = layout.dir();
        let revision = match revision {
            Some(rev) => rev,
            None => Self::committed_revision(layout)?,
        };
        let postlist = Table::open(dir, "postlist", config, Some(revision), false)?;
        let revision = Some(postlist.revision());
        let open = |name: &str| -> Result<Arc<Table>> {
            Ok(Arc::new(Table::open(dir, name, config, revision, false)?))
        };
        Ok(BrassTables {
            record: open("record")?,
            termlist: open("termlist")?,
            position: open("position")?,
            value: open("value")?,
            spelling: open("spelling")?,
            synonym: open("synonym")?,
            metadata: open("metadata")?,
            postlist: Arc::new(postlist),
        })
    }

    /// Newest revision every table has a base for. A commit interrupted
    /// part way through leaves some tables a revision ahead; those are
    /// opened at the older revision.
    pub fn committed_revision(layout: &DatabaseLayout) -> Result<Revision> {
        let mut shared: Option<Vec<Revision>> = None;
        for name in TABLE_NAMES {
            let revs = TableBase::revisions(&layout.dir().join(name));
            shared = Some(match shared {
                None => revs,
                Some(prev) => prev.into_iter().filter(|r| revs.contains(r)).collect(),
            });
        }
        let newest = shared.and_then(|revs| revs.into_iter().max()).ok_or_else(|| {
            Error::new(
                ErrorKind::DatabaseOpening,
                format!("no revision common to every table in {}", layout.dir().display()),
            )
        })?;
        let postlist = TableBase::revisions(&layout.dir().join("postlist"));
        if postlist.first() != Some(&newest) {
            warn!(
                "{}: ignoring incomplete commit, opening revision {}",
                layout.dir().display(), newest
            );
        }
        Ok(newest)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Table>> {
        let table = match name {
            "record" => &self.record,
            "termlist" => &self.termlist,
            "position" => &self.position,
            "value" => &self.value,
            "spelling" => &self.spelling,
            "synonym" => &self.synonym,
            "metadata" => &self.metadata,
            "postlist" => &self.postlist,
            _ => return None,
        };
        Some(table)
    }

    /// Tables in commit order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Table>> {
        TABLE_NAMES.iter().filter_map(move |name| self.get(name))
    }
}

/// Every (key, tag) pair under `prefix`.
pub(crate) fn scan_prefix(table: &Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut out = Vec::new();
    let mut cursor = table.cursor();
    cursor.seek_ge(prefix)?;
    while let Some(key) = cursor.key() {
        if !key.starts_with(prefix) {
            break;
        }
        let key = key.to_vec();
        if let Some(tag) = cursor.tag()? {
            out.push((key, tag));
        }
        cursor.next()?;
    }
    Ok(out)
}

pub struct BrassDatabase {
    layout: DatabaseLayout,
    config: Config,
    tables: BrassTables,
    stats: CollectionStats,
    doclens: TermStats,
    policy: SkipPolicy,
}

impl BrassDatabase {
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        Self::open_at(path, config, None)
    }

    /// Open the snapshot committed as `revision`, or the newest one.
    pub fn open_at(path: impl AsRef<Path>, config: &Config, revision: Option<Revision>) -> Result<Self> {
        let layout = DatabaseLayout::new(path.as_ref());
        let tables = BrassTables::open(&layout, config, revision)?;
        let stats = read_collection_stats(&tables.postlist)?;
        let doclens = term_stats(&tables.postlist, "")?;
        info!(
            "opened database {} at revision {} ({} documents)",
            layout.dir().display(), tables.postlist.revision(), doclens.termfreq
        );
        Ok(BrassDatabase {
            layout,
            config: config.clone(),
            tables,
            stats,
            doclens,
            policy: SkipPolicy { large_gap: config.skip_large_gap, large_freq: config.skip_large_freq },
        })
    }

    pub fn revision(&self) -> Revision {
        self.tables.postlist.revision()
    }

    pub fn tables(&self) -> &BrassTables {
        &self.tables
    }

    pub fn layout(&self) -> &DatabaseLayout {
        &self.layout
    }

    /// Move to the newest committed revision. Returns whether it changed.
    pub fn reopen(&mut self) -> Result<bool> {
        let fresh = BrassDatabase::open_at(self.layout.dir(), &self.config, None)?;
        if fresh.revision() == self.revision() {
            return Ok(false);
        }
        *self = fresh;
        Ok(true)
    }

    fn doclen_cursor(&self, did: DocId) -> Result<BrassPostList> {
        let mut pl = BrassPostList::open(self.tables.postlist.clone(), "", self.policy)?;
        pl.skip_to(did)?;
        if pl.at_end() || pl.docid() != did {
            return Err(doc_not_found(did));
        }
        Ok(pl)
    }

    fn document_values(&self, did: DocId) -> Result<std::collections::BTreeMap<ValueSlot, Vec<u8>>> {
        match self.tables.value.get(&document_key(did))? {
            Some(tag) => decode_document_values(&tag),
            None => Ok(Default::default()),
        }
    }

    fn stored_termlist(&self, did: DocId) -> Result<StoredTermList> {
        match self.tables.termlist.get(&termlist_key(did))? {
            Some(tag) => StoredTermList::decode(&tag),
            None => Err(doc_not_found(did)),
        }
    }
}

impl DatabaseInternal for BrassDatabase {
    fn doccount(&self) -> DocCount {
        self.doclens.termfreq
    }

    fn last_docid(&self) -> DocId {
        self.stats.last_docid
    }

    fn total_length(&self) -> u64 {
        self.doclens.collfreq
    }

    fn doclength_lower_bound(&self) -> TermCount {
        self.stats.doclen_lbound
    }

    fn doclength_upper_bound(&self) -> TermCount {
        self.stats.doclen_ubound
    }

    fn wdf_upper_bound(&self, term: &str) -> Result<TermCount> {
        let cf = term_stats(&self.tables.postlist, term)?.collfreq;
        let cf = TermCount::try_from(cf).unwrap_or(TermCount::MAX);
        Ok(if self.stats.wdf_ubound > 0 { cf.min(self.stats.wdf_ubound) } else { cf })
    }

    fn termfreq(&self, term: &str) -> Result<DocCount> {
        if term.is_empty() {
            return Ok(self.doccount());
        }
        Ok(term_stats(&self.tables.postlist, term)?.termfreq)
    }

    fn collection_freq(&self, term: &str) -> Result<u64> {
        if term.is_empty() {
            return Ok(self.total_length());
        }
        Ok(term_stats(&self.tables.postlist, term)?.collfreq)
    }

    fn doclength(&self, did: DocId) -> Result<TermCount> {
        Ok(self.doclen_cursor(did)?.wdf())
    }

    fn unique_terms(&self, did: DocId) -> Result<TermCount> {
        Ok(self.doclen_cursor(did)?.unique_terms())
    }

    fn open_post_list(&self, term: &str) -> Result<Box<dyn TermCursor>> {
        Ok(Box::new(BrassPostList::open(self.tables.postlist.clone(), term, self.policy)?))
    }

    fn open_term_list(&self, did: DocId) -> Result<Vec<TermListEntry>> {
        Ok(self.stored_termlist(did)?.entries)
    }

    fn open_position_list(&self, did: DocId, term: &str) -> Result<Box<dyn PositionList>> {
        match self.tables.position.get(&position_key(did, term))? {
            Some(tag) => Ok(Box::new(EncodedPositionList::decode(&tag)?)),
            None => Ok(Box::new(EncodedPositionList::empty())),
        }
    }

    fn has_positions(&self) -> bool {
        !self.tables.position.is_empty()
    }

    fn get_value(&self, did: DocId, slot: ValueSlot) -> Result<Option<Vec<u8>>> {
        Ok(self.document_values(did)?.remove(&slot))
    }

    fn open_value_stream(&self, slot: ValueSlot) -> Result<Box<dyn ValueCursor>> {
        Ok(Box::new(BrassValueCursor::new(self.tables.value.clone(), slot)))
    }

    fn value_stats(&self, slot: ValueSlot) -> Result<ValueStats> {
        match self.tables.value.get(&stats_key(slot))? {
            Some(tag) => decode_stats(&tag),
            None => Ok(ValueStats::default()),
        }
    }

    fn get_metadata(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_metadata_key(key)?;
        self.tables.metadata.get(key)
    }

    fn metadata_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.tables.metadata.keys_with_prefix(prefix)
    }

    fn all_terms(&self, prefix: &str) -> Result<Vec<String>> {
        let mut start = Vec::with_capacity(prefix.len() + 2);
        VByteEncoder::encode_sortable(&mut start, prefix.as_bytes(), true);
        let mut terms = Vec::new();
        let mut cursor = self.tables.postlist.cursor();
        cursor.seek_ge(&start)?;
        while let Some(key) = cursor.key() {
            if !key.starts_with(&start) {
                break;
            }
            if let Some((term, None)) = parse_key(key)? {
                if !term.is_empty() && term.starts_with(prefix.as_bytes()) {
                    terms.push(String::from_utf8(term).map_err(|_| Error::corrupt("term isn't UTF-8"))?);
                }
            }
            cursor.next()?;
        }
        Ok(terms)
    }

    fn open_document(&self, did: DocId) -> Result<Document> {
        if did == 0 {
            return Err(Error::invalid_argument("docid 0 is invalid"));
        }
        let data = self.tables.record.get(&record_key(did))?.ok_or_else(|| doc_not_found(did))?;
        let mut doc = Document::new();
        doc.set_data(data);
        for entry in self.stored_termlist(did)?.entries {
            let positions = match self.tables.position.get(&position_key(did, &entry.term))? {
                Some(tag) => EncodedPositionList::decode(&tag)?.to_vec()?,
                None => Vec::new(),
            };
            doc.insert_term(entry.term, DocTerm { wdf: entry.wdf, positions });
        }
        for (slot, value) in self.document_values(did)? {
            doc.add_value(slot, value);
        }
        Ok(doc)
    }

    fn synonyms(&self, term: &str) -> Result<Vec<String>> {
        if term.is_empty() {
            return Ok(Vec::new());
        }
        match self.tables.synonym.get(&synonym_key(term)?)? {
            Some(tag) => decode_synonyms(&tag),
            None => Ok(Vec::new()),
        }
    }

    fn synonym_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.tables.synonym.keys_with_prefix(prefix.as_bytes())?
            .into_iter()
            .map(|k| String::from_utf8(k).map_err(|_| Error::corrupt("synonym key isn't UTF-8")))
            .collect()
    }

    fn spelling_frequency(&self, word: &str) -> Result<DocCount> {
        if word.is_empty() {
            return Ok(0);
        }
        match self.tables.spelling.get(&spelling_key(word)?)? {
            Some(tag) => decode_freq(&tag),
            None => Ok(0),
        }
    }

    fn spelling_words(&self) -> Result<Vec<(String, DocCount)>> {
        let mut words = Vec::new();
        for (key, tag) in scan_prefix(&self.tables.spelling, &words_prefix())? {
            if let Some(word) = parse_spelling_key(&key) {
                words.push((word, decode_freq(&tag)?));
            }
        }
        Ok(words)
    }

    fn description(&self) -> String {
        format!("Brass({})", self.layout.dir().display())
    }
}

/// Stream of one slot's values in docid order.
pub struct BrassValueCursor {
    cursor: TableCursor<Arc<Table>>,
    slot: ValueSlot,
    did: DocId,
    value: Vec<u8>,
    started: bool,
    at_end: bool,
}

impl BrassValueCursor {
    pub fn new(table: Arc<Table>, slot: ValueSlot) -> Self {
        BrassValueCursor {
            cursor: TableCursor::new(table),
            slot,
            did: 0,
            value: Vec::new(),
            started: false,
            at_end: false,
        }
    }

    /// Pick up the entry under the cursor, or finish if it's past the slot.
    fn load(&mut self) -> Result<()> {
        let did = self.cursor.key().and_then(|key| parse_stream_key(self.slot, key));
        match did {
            Some(did) => {
                self.did = did;
                self.value = self.cursor.tag()?.unwrap_or_default();
            }
            None => self.at_end = true,
        }
        Ok(())
    }
}

impl ValueCursor for BrassValueCursor {
    fn docid(&self) -> DocId {
        self.did
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn at_end(&self) -> bool {
        self.at_end
    }

    fn next(&mut self) -> Result<()> {
        if self.at_end {
            return Ok(());
        }
        if !self.started {
            self.started = true;
            self.cursor.seek_ge(&stream_prefix(self.slot))?;
        } else {
            self.cursor.next()?;
        }
        self.load()
    }

    fn skip_to(&mut self, did: DocId) -> Result<()> {
        if self.at_end || (self.started && did <= self.did) {
            return Ok(());
        }
        self.started = true;
        let mut key = stream_prefix(self.slot).to_vec();
        key.extend_from_slice(&did.to_be_bytes());
        self.cursor.seek_ge(&key)?;
        self.load()
    }
}
