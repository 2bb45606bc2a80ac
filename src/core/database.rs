use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::backend::brass::BrassDatabase;
use crate::backend::brass_writer::BrassWriter;
use crate::backend::{DatabaseInternal, TermListEntry};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::stats::DatabaseStats;
use crate::core::types::{DocCount, DocId, Document, Revision, TermCount, TermPos, ValueSlot};
use crate::index::spelling::SpellingAutomaton;

/// A read-only handle on a database snapshot. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    internal: Arc<dyn DatabaseInternal>,
}

impl Database {
    /// Open the newest committed revision of the database at `path`.
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        Ok(Database::from_internal(Arc::new(BrassDatabase::open(path, config)?)))
    }

    pub fn open_at(path: impl AsRef<Path>, config: &Config, revision: Revision) -> Result<Self> {
        Ok(Database::from_internal(Arc::new(BrassDatabase::open_at(path, config, Some(revision))?)))
    }

    /// Wrap any backend, e.g. an `InMemoryDatabase`.
    pub fn from_internal(internal: Arc<dyn DatabaseInternal>) -> Self {
        Database { internal }
    }

    pub fn internal(&self) -> &Arc<dyn DatabaseInternal> {
        &self.internal
    }

    pub fn doccount(&self) -> DocCount {
        self.internal.doccount()
    }

    pub fn last_docid(&self) -> DocId {
        self.internal.last_docid()
    }

    pub fn avlength(&self) -> f64 {
        self.internal.avlength()
    }

    pub fn termfreq(&self, term: &str) -> Result<DocCount> {
        self.internal.termfreq(term)
    }

    pub fn collection_freq(&self, term: &str) -> Result<u64> {
        self.internal.collection_freq(term)
    }

    pub fn term_exists(&self, term: &str) -> Result<bool> {
        self.internal.term_exists(term)
    }

    pub fn doclength(&self, did: DocId) -> Result<TermCount> {
        self.internal.doclength(did)
    }

    pub fn document(&self, did: DocId) -> Result<Document> {
        self.internal.open_document(did)
    }

    /// Every (docid, wdf) posting of `term`.
    pub fn postings(&self, term: &str) -> Result<Vec<(DocId, TermCount)>> {
        let mut cursor = self.internal.open_post_list(term)?;
        let mut out = Vec::with_capacity(cursor.termfreq() as usize);
        cursor.next()?;
        while !cursor.at_end() {
            out.push((cursor.docid(), cursor.wdf()));
            cursor.next()?;
        }
        Ok(out)
    }

    pub fn termlist(&self, did: DocId) -> Result<Vec<TermListEntry>> {
        self.internal.open_term_list(did)
    }

    pub fn positions(&self, did: DocId, term: &str) -> Result<Vec<TermPos>> {
        let mut pl = self.internal.open_position_list(did, term)?;
        let mut out = Vec::with_capacity(pl.size() as usize);
        while pl.next()? {
            out.push(pl.position());
        }
        Ok(out)
    }

    pub fn value(&self, did: DocId, slot: ValueSlot) -> Result<Option<Vec<u8>>> {
        self.internal.get_value(did, slot)
    }

    pub fn metadata(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.internal.get_metadata(key)
    }

    pub fn metadata_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.internal.metadata_keys(prefix)
    }

    pub fn all_terms(&self, prefix: &str) -> Result<Vec<String>> {
        self.internal.all_terms(prefix)
    }

    pub fn synonyms(&self, term: &str) -> Result<Vec<String>> {
        self.internal.synonyms(term)
    }

    pub fn synonym_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.internal.synonym_keys(prefix)
    }

    /// The most likely intended word within `max_edits` edits of `word`,
    /// if the spelling table knows a more frequent one.
    pub fn spelling_suggestion(&self, word: &str, max_edits: u8) -> Result<Option<String>> {
        let own = self.internal.spelling_frequency(word)?;
        let automaton = SpellingAutomaton::new(word, max_edits);
        Ok(automaton.best(self.internal.spelling_words()?, own))
    }

    pub fn description(&self) -> String {
        self.internal.description()
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats::collect(self.internal.as_ref())
    }
}

/// The single writer of an on-disk database.
///
/// Changes stay invisible, including to `reader()`, until `commit`.
pub struct WritableDatabase {
    writer: BrassWriter,
    reader: Database,
    config: Config,
}

impl WritableDatabase {
    pub fn create(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let writer = BrassWriter::create(path.as_ref(), config)?;
        Self::with_writer(writer, path.as_ref(), config)
    }

    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let writer = BrassWriter::open(path.as_ref(), config)?;
        Self::with_writer(writer, path.as_ref(), config)
    }

    pub fn create_or_open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let writer = BrassWriter::create_or_open(path.as_ref(), config)?;
        Self::with_writer(writer, path.as_ref(), config)
    }

    fn with_writer(writer: BrassWriter, path: &Path, config: &Config) -> Result<Self> {
        let reader = Database::open(path, config)?;
        Ok(WritableDatabase { writer, reader, config: config.clone() })
    }

    /// The last committed state.
    pub fn reader(&self) -> &Database {
        &self.reader
    }

    pub fn revision(&self) -> Revision {
        self.writer.revision()
    }

    /// Includes uncommitted changes.
    pub fn doccount(&self) -> DocCount {
        self.writer.doccount()
    }

    pub fn last_docid(&self) -> DocId {
        self.writer.last_docid()
    }

    pub fn has_changes(&self) -> bool {
        self.writer.has_changes()
    }

    pub fn add_document(&mut self, doc: &Document) -> Result<DocId> {
        self.writer.add_document(doc)
    }

    /// Adds the document under `did` if there's none there yet.
    pub fn replace_document(&mut self, did: DocId, doc: &Document) -> Result<()> {
        self.writer.replace_document(did, doc)
    }

    pub fn delete_document(&mut self, did: DocId) -> Result<()> {
        self.writer.delete_document(did)
    }

    /// An empty value removes the key.
    pub fn set_metadata(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writer.set_metadata(key, value)
    }

    pub fn add_spelling(&mut self, word: &str, inc: DocCount) -> Result<()> {
        self.writer.add_spelling(word, inc)
    }

    pub fn remove_spelling(&mut self, word: &str, dec: DocCount) -> Result<()> {
        self.writer.remove_spelling(word, dec)
    }

    pub fn add_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        self.writer.add_synonym(term, synonym)
    }

    pub fn remove_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        self.writer.remove_synonym(term, synonym)
    }

    pub fn clear_synonyms(&mut self, term: &str) -> Result<()> {
        self.writer.clear_synonyms(term)
    }

    /// Publish every change made so far and move the reader onto it.
    pub fn commit(&mut self) -> Result<Revision> {
        let revision = self.writer.commit()?;
        self.reader = Database::open(self.writer.layout().dir(), &self.config)?;
        debug!("reader moved to revision {}", revision);
        Ok(revision)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.writer.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use tempfile::TempDir;

    fn doc(terms: &[&str]) -> Document {
        let mut doc = Document::new();
        for (i, term) in terms.iter().enumerate() {
            doc.add_posting(term, i as TermPos + 1, 1).unwrap();
        }
        doc
    }

    #[test]
    fn reader_sees_commits_only() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let mut db = WritableDatabase::create(dir.path(), &config).unwrap();
        db.add_document(&doc(&["cat", "dog"])).unwrap();
        db.add_document(&doc(&["cat"])).unwrap();
        assert_eq!(db.doccount(), 2);
        assert_eq!(db.reader().doccount(), 0);

        db.commit().unwrap();
        let reader = db.reader().clone();
        assert_eq!(reader.doccount(), 2);
        assert_eq!(reader.postings("cat").unwrap(), vec![(1, 1), (2, 1)]);
        assert_eq!(reader.positions(1, "dog").unwrap(), vec![2]);

        db.delete_document(1).unwrap();
        db.commit().unwrap();
        assert_eq!(reader.doccount(), 2);
        assert_eq!(db.reader().doccount(), 1);
        assert!(db.reader().document(1).unwrap_err().is(ErrorKind::DocNotFound));
    }

    #[test]
    fn cancel_discards() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let mut db = WritableDatabase::create(dir.path(), &config).unwrap();
        db.add_document(&doc(&["a"])).unwrap();
        db.commit().unwrap();
        db.add_document(&doc(&["b"])).unwrap();
        db.set_metadata(b"k", b"v").unwrap();
        db.cancel().unwrap();
        db.commit().unwrap();
        assert_eq!(db.reader().doccount(), 1);
        assert_eq!(db.reader().metadata(b"k").unwrap(), None);
        assert!(!db.reader().term_exists("b").unwrap());
    }

    #[test]
    fn spelling_and_synonyms() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let mut db = WritableDatabase::create(dir.path(), &config).unwrap();
        db.add_spelling("the", 5).unwrap();
        db.add_spelling("then", 1).unwrap();
        db.add_synonym("car", "auto").unwrap();
        db.add_synonym("car", "automobile").unwrap();
        db.commit().unwrap();
        assert_eq!(db.reader().spelling_suggestion("teh", 2).unwrap(), Some("the".to_string()));
        assert_eq!(db.reader().synonyms("car").unwrap(), vec!["auto", "automobile"]);

        db.clear_synonyms("car").unwrap();
        db.commit().unwrap();
        assert!(db.reader().synonyms("car").unwrap().is_empty());
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let _db = WritableDatabase::create(dir.path(), &config).unwrap();
        let err = WritableDatabase::open(dir.path(), &config).err().unwrap();
        assert!(err.is(ErrorKind::DatabaseLock));
    }
}
