//! Buffers posting changes per term until they're merged into the
//! postlist table.

use std::collections::BTreeMap;

use log::debug;

use crate::core::error::Result;
use crate::core::types::{DocId, Document};
use crate::index::posting::Posting;
use crate::index::postlist_table::{merge_postings, PostingChanges};
use crate::index::termlist::StoredTermList;
use crate::storage::table::Table;

#[derive(Debug, Default)]
pub struct Inverter {
    postings: BTreeMap<String, PostingChanges>,
    doclens: PostingChanges,
    pending_docs: usize,
}

impl Inverter {
    pub fn new() -> Self {
        Inverter::default()
    }

    /// Documents changed since the last flush.
    pub fn pending(&self) -> usize {
        self.pending_docs
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty() && self.doclens.is_empty()
    }

    pub fn clear(&mut self) {
        self.postings.clear();
        self.doclens.clear();
        self.pending_docs = 0;
    }

    pub fn add_document(&mut self, did: DocId, doc: &Document) {
        for (term, info) in doc.terms() {
            self.postings
                .entry(term.to_string())
                .or_default()
                .insert(did, Some(Posting::new(did, info.wdf)));
        }
        let doclen = Posting { did, wdf: doc.doclength(), uniq: doc.termlist_count() as u32 };
        self.doclens.insert(did, Some(doclen));
        self.pending_docs += 1;
    }

    /// Remove every posting of `did`, as listed by its stored termlist.
    pub fn delete_document(&mut self, did: DocId, old: &StoredTermList) {
        for entry in &old.entries {
            self.postings.entry(entry.term.clone()).or_default().insert(did, None);
        }
        self.doclens.insert(did, None);
        self.pending_docs += 1;
    }

    pub fn replace_document(&mut self, did: DocId, old: &StoredTermList, doc: &Document) {
        self.delete_document(did, old);
        self.add_document(did, doc);
        self.pending_docs -= 1;
    }

    /// Pending change for `term` in `did`, if any: `Some(None)` means the
    /// posting is being removed.
    pub fn pending_posting(&self, term: &str, did: DocId) -> Option<Option<Posting>> {
        self.postings.get(term).and_then(|c| c.get(&did)).copied()
    }

    /// Merge everything buffered into `table`.
    pub fn flush(&mut self, table: &mut Table, chunk_size: usize) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        debug!(
            "flushing postings: {} terms, {} documents changed",
            self.postings.len(), self.pending_docs
        );
        if !self.doclens.is_empty() {
            merge_postings(table, b"", &self.doclens, chunk_size)?;
        }
        for (term, changes) in &self.postings {
            merge_postings(table, term.as_bytes(), changes, chunk_size)?;
        }
        self.clear();
        Ok(())
    }
}
