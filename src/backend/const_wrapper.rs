//! Read-only view over any backend.

use std::sync::Arc;

use crate::backend::{DatabaseInternal, PositionList, TermCursor, TermListEntry, ValueCursor, ValueStats};
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, DocId, Document, TermCount, ValueSlot};

/// Forwards every read and refuses every write with `Unimplemented`.
#[derive(Clone)]
pub struct ConstDatabaseWrapper {
    inner: Arc<dyn DatabaseInternal>,
}

impl ConstDatabaseWrapper {
    pub fn new(inner: Arc<dyn DatabaseInternal>) -> Self {
        ConstDatabaseWrapper { inner }
    }

    fn refuse(&self, what: &str) -> Error {
        Error::unimplemented(format!("{} on a read-only view of {}", what, self.inner.description()))
    }
}

impl DatabaseInternal for ConstDatabaseWrapper {
    fn doccount(&self) -> DocCount { self.inner.doccount() }
    fn last_docid(&self) -> DocId { self.inner.last_docid() }
    fn total_length(&self) -> u64 { self.inner.total_length() }
    fn avlength(&self) -> f64 { self.inner.avlength() }
    fn doclength_lower_bound(&self) -> TermCount { self.inner.doclength_lower_bound() }
    fn doclength_upper_bound(&self) -> TermCount { self.inner.doclength_upper_bound() }

    fn wdf_upper_bound(&self, term: &str) -> Result<TermCount> {
        self.inner.wdf_upper_bound(term)
    }

    fn termfreq(&self, term: &str) -> Result<DocCount> {
        self.inner.termfreq(term)
    }

    fn collection_freq(&self, term: &str) -> Result<u64> {
        self.inner.collection_freq(term)
    }

    fn term_exists(&self, term: &str) -> Result<bool> {
        self.inner.term_exists(term)
    }

    fn doclength(&self, did: DocId) -> Result<TermCount> {
        self.inner.doclength(did)
    }

    fn unique_terms(&self, did: DocId) -> Result<TermCount> {
        self.inner.unique_terms(did)
    }

    fn wdf_doc_max(&self, did: DocId) -> Result<TermCount> {
        self.inner.wdf_doc_max(did)
    }

    fn open_post_list(&self, term: &str) -> Result<Box<dyn TermCursor>> {
        self.inner.open_post_list(term)
    }

    fn open_term_list(&self, did: DocId) -> Result<Vec<TermListEntry>> {
        self.inner.open_term_list(did)
    }

    fn open_position_list(&self, did: DocId, term: &str) -> Result<Box<dyn PositionList>> {
        self.inner.open_position_list(did, term)
    }

    fn has_positions(&self) -> bool {
        self.inner.has_positions()
    }

    fn get_value(&self, did: DocId, slot: ValueSlot) -> Result<Option<Vec<u8>>> {
        self.inner.get_value(did, slot)
    }

    fn open_value_stream(&self, slot: ValueSlot) -> Result<Box<dyn ValueCursor>> {
        self.inner.open_value_stream(slot)
    }

    fn value_stats(&self, slot: ValueSlot) -> Result<ValueStats> {
        self.inner.value_stats(slot)
    }

    fn get_metadata(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get_metadata(key)
    }

    fn metadata_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.inner.metadata_keys(prefix)
    }

    fn all_terms(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.all_terms(prefix)
    }

    fn open_document(&self, did: DocId) -> Result<Document> {
        self.inner.open_document(did)
    }

    fn synonyms(&self, term: &str) -> Result<Vec<String>> {
        self.inner.synonyms(term)
    }

    fn synonym_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.synonym_keys(prefix)
    }

    fn spelling_frequency(&self, word: &str) -> Result<DocCount> {
        self.inner.spelling_frequency(word)
    }

    fn spelling_words(&self) -> Result<Vec<(String, DocCount)>> {
        self.inner.spelling_words()
    }

    fn description(&self) -> String {
        format!("Const({})", self.inner.description())
    }

    fn add_document(&mut self, _doc: &Document) -> Result<DocId> {
        Err(self.refuse("add_document"))
    }

    fn replace_document(&mut self, _did: DocId, _doc: &Document) -> Result<()> {
        Err(self.refuse("replace_document"))
    }

    fn delete_document(&mut self, _did: DocId) -> Result<()> {
        Err(self.refuse("delete_document"))
    }

    fn set_metadata(&mut self, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(self.refuse("set_metadata"))
    }

    fn commit(&mut self) -> Result<()> {
        Err(self.refuse("commit"))
    }
}
