//! Whole-database consistency check.
//!
//! Runs the structural table check on every table and then cross-checks
//! the postlist table: chunk ordering and flags, per-term statistics
//! against the entries actually stored, and the document length stream
//! against the termlists.

use std::path::Path;

use log::debug;

use crate::backend::brass::BrassDatabase;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::{DocId, Revision};
use crate::index::posting::{decode_chunk, decode_stats, parse_key, CollectionStats, TermStats};
use crate::index::postlist_table::read_collection_stats;
use crate::index::termlist::{termlist_key, StoredTermList};
use crate::storage::check::{check_table, printable_key, CheckOptions, TableCheckReport};
use crate::storage::layout::DatabaseLayout;

#[derive(Debug, Clone, Default)]
pub struct DatabaseCheckReport {
    pub revision: Revision,
    pub tables: Vec<TableCheckReport>,
    /// Problems found by the cross-table checks.
    pub errors: Vec<String>,
}

impl DatabaseCheckReport {
    pub fn error_count(&self) -> usize {
        self.errors.len() + self.tables.iter().map(|t| t.errors.len()).sum::<usize>()
    }

    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }
}

/// Running state for the term whose chunks are being walked.
struct TermWalk {
    term: Vec<u8>,
    stats: TermStats,
    entries: u64,
    wdf_sum: u64,
    last_did: DocId,
    seen_last: bool,
}

impl TermWalk {
    fn finish(self, errors: &mut Vec<String>) {
        let name = printable_key(&self.term);
        if !self.seen_last {
            errors.push(format!("term '{}': no chunk is marked as the last", name));
        }
        if self.entries != self.stats.termfreq as u64 {
            errors.push(format!(
                "termfreq mismatch for '{}': header says {} but {} entries are stored",
                name, self.stats.termfreq, self.entries
            ));
        }
        if self.wdf_sum != self.stats.collfreq {
            errors.push(format!(
                "collfreq mismatch for '{}': header says {} but the wdfs sum to {}",
                name, self.stats.collfreq, self.wdf_sum
            ));
        }
    }
}

/// Check the postlist table of `db` against itself and the termlists.
pub fn check_postlists(db: &BrassDatabase) -> Result<Vec<String>> {
    let tables = db.tables();
    let postlist = &tables.postlist;
    let mut errors = Vec::new();
    let collection: CollectionStats = match read_collection_stats(postlist) {
        Ok(stats) => stats,
        Err(e) => {
            errors.push(format!("collection statistics unreadable: {}", e));
            CollectionStats::default()
        }
    };

    let mut walk: Option<TermWalk> = None;
    let mut cursor = postlist.cursor();
    while cursor.next()? {
        let Some(key) = cursor.key() else { break };
        let key = key.to_vec();
        let (term, first) = match parse_key(&key) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(e) => {
                errors.push(format!("bad postlist key {}: {}", printable_key(&key), e));
                continue;
            }
        };
        let tag = match cursor.tag() {
            Ok(Some(tag)) => tag,
            Ok(None) => continue,
            Err(e) => {
                errors.push(format!("postlist entry {} unreadable: {}", printable_key(&key), e));
                continue;
            }
        };
        let is_doclens = term.is_empty();

        if first.is_none() {
            if let Some(done) = walk.take() {
                done.finish(&mut errors);
            }
            let stats = match decode_stats(&tag) {
                Ok(stats) => stats,
                Err(e) => {
                    errors.push(format!("term '{}': bad first chunk: {}", printable_key(&term), e));
                    continue;
                }
            };
            walk = Some(TermWalk { term: term.clone(), stats, entries: 0, wdf_sum: 0, last_did: 0, seen_last: false });
        }
        let Some(state) = walk.as_mut().filter(|w| w.term == term) else {
            errors.push(format!("term '{}': chunk without a first chunk", printable_key(&term)));
            continue;
        };
        let chunk = match decode_chunk(&tag, first, is_doclens) {
            Ok((_, chunk)) => chunk,
            Err(e) => {
                errors.push(format!("term '{}': malformed chunk: {}", printable_key(&term), e));
                continue;
            }
        };
        if state.seen_last {
            errors.push(format!("term '{}': chunk after the last chunk", printable_key(&term)));
        }
        if chunk.first <= state.last_did {
            errors.push(format!(
                "term '{}': chunk starting at {} overlaps the previous one ending at {}",
                printable_key(&term), chunk.first, state.last_did
            ));
        }
        state.seen_last = chunk.is_last;
        state.last_did = chunk.last;
        state.entries += chunk.postings.len() as u64;
        for p in &chunk.postings {
            state.wdf_sum += p.wdf as u64;
            if p.did > collection.last_docid {
                errors.push(format!(
                    "term '{}': docid {} is beyond the last docid {}",
                    printable_key(&term), p.did, collection.last_docid
                ));
            }
            if is_doclens {
                check_doclen(db, p.did, p.wdf, p.uniq, &mut errors)?;
            } else if p.wdf > collection.wdf_ubound {
                errors.push(format!(
                    "term '{}': wdf {} in document {} exceeds the bound {}",
                    printable_key(&term), p.wdf, p.did, collection.wdf_ubound
                ));
            }
        }
    }
    if let Some(done) = walk.take() {
        done.finish(&mut errors);
    }
    Ok(errors)
}

fn check_doclen(db: &BrassDatabase, did: DocId, doclen: u32, uniq: u32, errors: &mut Vec<String>) -> Result<()> {
    let Some(tag) = db.tables().termlist.get(&termlist_key(did))? else {
        errors.push(format!("document {} has a length but no termlist", did));
        return Ok(());
    };
    match StoredTermList::decode(&tag) {
        Ok(termlist) => {
            let sum: u32 = termlist.entries.iter().map(|e| e.wdf).sum();
            if termlist.doclen != doclen || sum != doclen {
                errors.push(format!(
                    "doclen mismatch for document {}: stream says {}, termlist says {} (wdf sum {})",
                    did, doclen, termlist.doclen, sum
                ));
            }
            if termlist.unique_terms() != uniq {
                errors.push(format!(
                    "unique term count mismatch for document {}: stream says {}, termlist has {}",
                    did, uniq, termlist.unique_terms()
                ));
            }
        }
        Err(e) => errors.push(format!("termlist of document {} unreadable: {}", did, e)),
    }
    Ok(())
}

/// Check the tables named in `only` (every table if empty), and the
/// postlist cross-checks whenever the postlist table is included.
pub fn check_database(
    path: impl AsRef<Path>,
    config: &Config,
    revision: Option<Revision>,
    only: &[&str],
    opts: CheckOptions,
) -> Result<DatabaseCheckReport> {
    for name in only {
        DatabaseLayout::check_table_name(name)?;
    }
    let db = BrassDatabase::open_at(path, config, revision)?;
    let mut report = DatabaseCheckReport { revision: db.revision(), ..Default::default() };
    for table in db.tables().iter() {
        if !only.is_empty() && !only.contains(&table.name()) {
            continue;
        }
        debug!("checking table {}", table.name());
        report.tables.push(check_table(table, opts)?);
    }
    if only.is_empty() || only.contains(&"postlist") {
        report.errors = check_postlists(&db)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::brass_writer::BrassWriter;
    use crate::core::types::Document;
    use tempfile::TempDir;

    #[test]
    fn fresh_database_checks_clean() {
        let dir = TempDir::new().unwrap();
        let config = Config { block_size: 2048, postlist_chunk_size: 64, ..Config::default() };
        let mut db = BrassWriter::create(dir.path(), &config).unwrap();
        for i in 0..300u32 {
            let mut doc = Document::new();
            doc.add_term("common", 1 + i % 3).unwrap();
            doc.add_term(&format!("t{}", i % 17), 1).unwrap();
            db.add_document(&doc).unwrap();
        }
        db.delete_document(40).unwrap();
        db.commit().unwrap();
        drop(db);

        let report = check_database(dir.path(), &config, None, &[], CheckOptions::default()).unwrap();
        assert!(report.is_ok(), "{:?} {:?}", report.errors, report.tables);
        assert_eq!(report.tables.len(), 8);
    }

    #[test]
    fn unknown_table_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = check_database(dir.path(), &Config::default(), None, &["nope"], CheckOptions::default());
        assert!(err.is_err());
    }
}
