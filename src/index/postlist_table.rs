//! Reading and updating chunked postlists.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace};

use crate::backend::TermCursor;
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, DocId, TermCount};
use crate::index::posting::{
    chunk_key, decode_chunk, decode_stats, encode_chunk, postlist_key, split_postings, Chunk,
    CollectionStats, Posting, TermStats, STATS_KEY,
};
use crate::storage::cursor::TableCursor;
use crate::storage::table::Table;

/// When `skip_to` may re-seek through the B-tree instead of stepping
/// through the chunks in between.
#[derive(Debug, Clone, Copy)]
pub struct SkipPolicy {
    pub large_gap: u32,
    pub large_freq: u32,
}

impl SkipPolicy {
    fn should_seek(&self, gap: u32, termfreq: DocCount) -> bool {
        gap > self.large_gap && termfreq >= self.large_freq
    }
}

pub fn read_collection_stats(table: &Table) -> Result<CollectionStats> {
    match table.get(STATS_KEY)? {
        Some(tag) => CollectionStats::decode(&tag),
        None => Ok(CollectionStats::default()),
    }
}

pub fn write_collection_stats(table: &mut Table, stats: &CollectionStats) -> Result<()> {
    table.add(STATS_KEY, &stats.encode())
}

/// termfreq and collfreq of `term`; zero for an absent term.
pub fn term_stats(table: &Table, term: &str) -> Result<TermStats> {
    match table.get(&postlist_key(term.as_bytes()))? {
        Some(tag) => decode_stats(&tag),
        None => Ok(TermStats::default()),
    }
}

/// Cursor over the postings of one term in a committed table.
pub struct BrassPostList {
    table: Arc<Table>,
    term: String,
    key: Vec<u8>,
    with_uniq: bool,
    stats: TermStats,
    policy: SkipPolicy,
    chunk: Option<Chunk>,
    /// Whether `chunk` is the term's first chunk.
    chunk_is_first: bool,
    idx: usize,
    started: bool,
    at_end: bool,
    cursor: TableCursor<Arc<Table>>,
    /// The table cursor sits on the current chunk's entry.
    cursor_on_chunk: bool,
}

impl BrassPostList {
    pub fn open(table: Arc<Table>, term: &str, policy: SkipPolicy) -> Result<Self> {
        let key = postlist_key(term.as_bytes());
        let with_uniq = term.is_empty();
        let (stats, chunk) = match table.get(&key)? {
            Some(tag) => {
                let (stats, chunk) = decode_chunk(&tag, None, with_uniq)?;
                (stats.unwrap_or_default(), Some(chunk))
            }
            None => (TermStats::default(), None),
        };
        let cursor = TableCursor::new(table.clone());
        Ok(BrassPostList {
            table,
            term: term.to_string(),
            key,
            with_uniq,
            stats,
            policy,
            chunk,
            chunk_is_first: true,
            idx: 0,
            started: false,
            at_end: false,
            cursor,
            cursor_on_chunk: false,
        })
    }

    /// Unique term count of the current document; only meaningful for the
    /// document length stream.
    pub fn unique_terms(&self) -> TermCount {
        self.current().map_or(0, |p| p.uniq)
    }

    fn current(&self) -> Option<&Posting> {
        if !self.started || self.at_end {
            return None;
        }
        self.chunk.as_ref().and_then(|c| c.postings.get(self.idx))
    }

    fn current_chunk_key(&self) -> Vec<u8> {
        match &self.chunk {
            Some(chunk) if !self.chunk_is_first => chunk_key(self.term.as_bytes(), chunk.first),
            _ => self.key.clone(),
        }
    }

    /// Decode the chunk the table cursor is on, which must belong to this
    /// term.
    fn load_from_cursor(&mut self) -> Result<()> {
        let key = self.cursor.key()
            .ok_or_else(|| Error::corrupt(format!("postlist for '{}' ends without a last chunk", self.term)))?
            .to_vec();
        if !key.starts_with(&self.key) {
            return Err(Error::corrupt(format!("postlist for '{}' ends without a last chunk", self.term)));
        }
        let rest = &key[self.key.len()..];
        let first = match rest.len() {
            0 => None,
            4 => Some(u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]])),
            _ => return Err(Error::corrupt(format!("bad postlist key for '{}'", self.term))),
        };
        let tag = self.cursor.tag()?
            .ok_or_else(|| Error::corrupt("postlist cursor lost its entry"))?;
        let (_, chunk) = decode_chunk(&tag, first, self.with_uniq)?;
        if let Some(first) = first {
            if chunk.first != first {
                return Err(Error::corrupt("chunk key and contents disagree"));
            }
        }
        trace!("postlist '{}': loaded chunk {}..={}", self.term, chunk.first, chunk.last);
        self.chunk_is_first = first.is_none();
        self.chunk = Some(chunk);
        self.idx = 0;
        self.cursor_on_chunk = true;
        Ok(())
    }

    fn next_chunk(&mut self) -> Result<()> {
        if !self.cursor_on_chunk {
            let key = self.current_chunk_key();
            if !self.cursor.seek_ge(&key)? {
                return Err(Error::corrupt(format!("chunk for '{}' vanished", self.term)));
            }
        }
        if !self.cursor.next()? {
            return Err(Error::corrupt(format!("postlist for '{}' ends without a last chunk", self.term)));
        }
        self.load_from_cursor()
    }

    /// Jump straight to the chunk which would hold `did`.
    fn seek_chunk(&mut self, did: DocId) -> Result<()> {
        let target = chunk_key(self.term.as_bytes(), did);
        self.cursor.find_entry(&target)?;
        self.load_from_cursor()
    }
}

impl TermCursor for BrassPostList {
    fn term(&self) -> &str {
        &self.term
    }

    fn termfreq(&self) -> DocCount {
        self.stats.termfreq
    }

    fn collection_freq(&self) -> u64 {
        self.stats.collfreq
    }

    fn docid(&self) -> DocId {
        self.current().map_or(0, |p| p.did)
    }

    fn wdf(&self) -> TermCount {
        self.current().map_or(0, |p| p.wdf)
    }

    fn at_end(&self) -> bool {
        self.at_end
    }

    fn next(&mut self) -> Result<()> {
        if self.at_end {
            return Ok(());
        }
        let Some(chunk) = &self.chunk else {
            self.started = true;
            self.at_end = true;
            return Ok(());
        };
        if !self.started {
            self.started = true;
            return Ok(());
        }
        if self.idx + 1 < chunk.postings.len() {
            self.idx += 1;
            return Ok(());
        }
        if chunk.is_last {
            self.at_end = true;
            return Ok(());
        }
        self.next_chunk()
    }

    fn skip_to(&mut self, did: DocId) -> Result<()> {
        if self.at_end {
            return Ok(());
        }
        if !self.started {
            self.started = true;
            if self.chunk.is_none() {
                self.at_end = true;
                return Ok(());
            }
        }
        let current = self.docid();
        if did <= current {
            return Ok(());
        }
        loop {
            let Some(chunk) = &self.chunk else {
                self.at_end = true;
                return Ok(());
            };
            if did <= chunk.last {
                self.idx = self.idx.max(chunk.lower_bound(did));
                return Ok(());
            }
            if chunk.is_last {
                self.at_end = true;
                return Ok(());
            }
            if self.policy.should_seek(did - chunk.last, self.stats.termfreq) {
                self.seek_chunk(did)?;
                // The chunk found may end before `did`; the loop moves on.
                let Some(chunk) = &self.chunk else { continue };
                if did <= chunk.last {
                    self.idx = chunk.lower_bound(did);
                    return Ok(());
                }
                if chunk.is_last {
                    self.at_end = true;
                    return Ok(());
                }
            }
            self.next_chunk()?;
        }
    }

    fn open_nearby(&self, term: &str) -> Result<Box<dyn TermCursor>> {
        Ok(Box::new(BrassPostList::open(self.table.clone(), term, self.policy)?))
    }
}

/// Changes for one term, keyed by docid: `Some` adds or replaces the
/// posting, `None` removes it.
pub type PostingChanges = BTreeMap<DocId, Option<Posting>>;

/// Where a chunk of the existing postlist is heading.
enum Piece {
    /// Untouched on disk.
    Kept { key: Vec<u8>, first: DocId, was_last: bool },
    New(Vec<Posting>),
}

/// Merge `changes` into a chunk's postings, adjusting the running
/// termfreq and collfreq deltas.
fn apply_changes<'a>(
    old: Vec<Posting>,
    changes: impl Iterator<Item = (&'a DocId, &'a Option<Posting>)>,
    tf_delta: &mut i64,
    cf_delta: &mut i64,
) -> Vec<Posting> {
    let mut out = Vec::with_capacity(old.len());
    let mut old = old.into_iter().peekable();
    for (&did, change) in changes {
        while let Some(p) = old.next_if(|p| p.did < did) {
            out.push(p);
        }
        if let Some(p) = old.next_if(|p| p.did == did) {
            *tf_delta -= 1;
            *cf_delta -= p.wdf as i64;
        }
        if let Some(p) = change {
            *tf_delta += 1;
            *cf_delta += p.wdf as i64;
            out.push(*p);
        }
    }
    out.extend(old);
    out
}

/// Apply buffered changes to the postlist of `term`, rewriting only the
/// chunks they touch. Returns the term's new statistics.
pub fn merge_postings(
    table: &mut Table,
    term: &[u8],
    changes: &PostingChanges,
    chunk_size: usize,
) -> Result<TermStats> {
    let with_uniq = term.is_empty();
    let first_key = postlist_key(term);

    // Existing chunk keys, in order. The first chunk is always rewritten
    // since its header carries the statistics.
    let mut old_keys: Vec<(Vec<u8>, Option<DocId>)> = Vec::new();
    {
        let mut cursor = table.cursor();
        cursor.seek_ge(&first_key)?;
        while let Some(key) = cursor.key() {
            if !key.starts_with(&first_key) {
                break;
            }
            let rest = &key[first_key.len()..];
            let first = match rest.len() {
                0 => None,
                4 => Some(u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]])),
                _ => return Err(Error::corrupt("bad postlist chunk key")),
            };
            old_keys.push((key.to_vec(), first));
            cursor.next()?;
        }
    }

    let mut tf_delta = 0i64;
    let mut cf_delta = 0i64;
    let mut old_stats = TermStats::default();
    let mut pieces: Vec<Piece> = Vec::with_capacity(old_keys.len() + 1);

    if old_keys.is_empty() {
        let postings = apply_changes(Vec::new(), changes.iter(), &mut tf_delta, &mut cf_delta);
        pieces.push(Piece::New(postings));
    } else {
        if old_keys[0].1.is_some() {
            return Err(Error::corrupt("postlist has chunks but no first chunk"));
        }
        let n = old_keys.len();
        for i in 0..n {
            let (key, first) = &old_keys[i];
            // Chunk i covers docids from its first (0 for chunk 0) up to
            // the next chunk's first.
            let lo = if i == 0 { 0 } else { first.unwrap_or(0) };
            let hi = old_keys.get(i + 1).and_then(|(_, f)| *f);
            let in_range = match hi {
                Some(hi) => changes.range(lo..hi),
                None => changes.range(lo..),
            };
            let touched = i == 0 || in_range.clone().next().is_some();
            if !touched {
                pieces.push(Piece::Kept { key: key.clone(), first: lo, was_last: i + 1 == n });
                continue;
            }
            let tag = table.get(key)?
                .ok_or_else(|| Error::corrupt("postlist chunk vanished during merge"))?;
            let (stats, chunk) = decode_chunk(&tag, *first, with_uniq)?;
            if let Some(stats) = stats {
                old_stats = stats;
            }
            if chunk.is_last != (i + 1 == n) {
                return Err(Error::corrupt(format!(
                    "postlist chunk {} of {} has the wrong last-chunk flag", i + 1, n
                )));
            }
            let postings = apply_changes(chunk.postings, in_range, &mut tf_delta, &mut cf_delta);
            pieces.push(Piece::New(postings));
        }
    }

    let termfreq = old_stats.termfreq as i64 + tf_delta;
    let collfreq = old_stats.collfreq as i64 + cf_delta;
    if termfreq < 0 || collfreq < 0 {
        return Err(Error::corrupt(format!(
            "postlist statistics went negative ({} / {})", termfreq, collfreq
        )));
    }
    let stats = TermStats { termfreq: termfreq as DocCount, collfreq: collfreq as u64 };

    // Split rewritten runs to the target size and drop emptied ones.
    let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match piece {
            Piece::New(postings) => {
                for part in split_postings(&postings, chunk_size, with_uniq) {
                    out.push(Piece::New(part.to_vec()));
                }
            }
            kept => out.push(kept),
        }
    }

    let n = out.len();
    let mut writes: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(n);
    let mut live_keys: Vec<Vec<u8>> = Vec::with_capacity(n);
    for (i, piece) in out.into_iter().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == n;
        let postings = match piece {
            Piece::Kept { key, was_last, .. } if !is_first && was_last == is_last => {
                live_keys.push(key);
                continue;
            }
            Piece::Kept { key, first, .. } => {
                let tag = table.get(&key)?
                    .ok_or_else(|| Error::corrupt("postlist chunk vanished during merge"))?;
                decode_chunk(&tag, Some(first), with_uniq)?.1.postings
            }
            Piece::New(postings) => postings,
        };
        let key = if is_first { first_key.clone() } else { chunk_key(term, postings[0].did) };
        let tag = encode_chunk(is_first.then_some(stats), &postings, is_last, with_uniq);
        live_keys.push(key.clone());
        writes.push((key, tag));
    }

    for (key, _) in &old_keys {
        if !live_keys.contains(key) {
            table.del(key)?;
        }
    }
    for (key, tag) in &writes {
        table.add(key, tag)?;
    }
    if old_keys.len() != n {
        debug!(
            "postlist '{}': {} chunks became {}",
            String::from_utf8_lossy(term), old_keys.len(), n
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use tempfile::TempDir;

    fn changes(adds: &[(DocId, TermCount)], dels: &[DocId]) -> PostingChanges {
        let mut map = PostingChanges::new();
        for &(did, wdf) in adds {
            map.insert(did, Some(Posting::new(did, wdf)));
        }
        for &did in dels {
            map.insert(did, None);
        }
        map
    }

    fn read_all(table: Arc<Table>, term: &str, policy: SkipPolicy) -> Vec<(DocId, TermCount)> {
        let mut pl = BrassPostList::open(table, term, policy).unwrap();
        let mut out = Vec::new();
        loop {
            pl.next().unwrap();
            if pl.at_end() {
                break;
            }
            out.push((pl.docid(), pl.wdf()));
        }
        out
    }

    const POLICY: SkipPolicy = SkipPolicy { large_gap: 16, large_freq: 4 };

    #[test]
    fn merges_across_many_chunks() {
        let dir = TempDir::new().unwrap();
        let config = Config { block_size: 2048, ..Config::default() };
        let mut table = Table::create(dir.path(), "postlist", &config).unwrap();

        let adds: Vec<(DocId, TermCount)> = (1..=3000).map(|d| (d * 2, d % 7 + 1)).collect();
        let stats = merge_postings(&mut table, b"term", &changes(&adds, &[]), 200).unwrap();
        assert_eq!(stats.termfreq, 3000);
        assert!(table.item_count() > 10);

        // Remove a band in the middle, add a few odd docids, then check.
        let dels: Vec<DocId> = (1000..=1400).map(|d| d * 2).collect();
        let stats = merge_postings(&mut table, b"term", &changes(&[(1, 5), (5001, 2)], &dels), 200).unwrap();
        assert_eq!(stats.termfreq, 3000 - 401 + 2);
        table.commit(1).unwrap();

        let reader = Arc::new(Table::open(dir.path(), "postlist", &config, None, false).unwrap());
        let all = read_all(reader.clone(), "term", POLICY);
        assert_eq!(all.len(), stats.termfreq as usize);
        assert_eq!(all[0], (1, 5));
        assert!(all.iter().all(|(d, _)| !(2000..=2800).contains(d)));
        let cf: u64 = all.iter().map(|(_, w)| *w as u64).sum();
        assert_eq!(cf, stats.collfreq);
        assert_eq!(term_stats(&reader, "term").unwrap(), stats);
    }

    #[test]
    fn skip_to_crosses_chunks_both_ways() {
        let dir = TempDir::new().unwrap();
        let config = Config { block_size: 2048, ..Config::default() };
        let mut table = Table::create(dir.path(), "postlist", &config).unwrap();
        let adds: Vec<(DocId, TermCount)> = (1..=2000).map(|d| (d * 3, 1)).collect();
        merge_postings(&mut table, b"x", &changes(&adds, &[]), 100).unwrap();
        table.commit(1).unwrap();
        let reader = Arc::new(table);

        for policy in [POLICY, SkipPolicy { large_gap: u32::MAX, large_freq: u32::MAX }] {
            let mut pl = BrassPostList::open(reader.clone(), "x", policy).unwrap();
            pl.skip_to(10).unwrap();
            assert_eq!(pl.docid(), 12);
            pl.skip_to(4000).unwrap();
            assert_eq!(pl.docid(), 4002);
            pl.skip_to(100).unwrap();
            assert_eq!(pl.docid(), 4002);
            pl.next().unwrap();
            assert_eq!(pl.docid(), 4005);
            pl.skip_to(6000).unwrap();
            assert_eq!(pl.docid(), 6000);
            pl.skip_to(6001).unwrap();
            assert!(pl.at_end());
        }
    }

    #[test]
    fn removing_everything_deletes_the_term() {
        let dir = TempDir::new().unwrap();
        let config = Config { block_size: 2048, ..Config::default() };
        let mut table = Table::create(dir.path(), "postlist", &config).unwrap();
        let adds: Vec<(DocId, TermCount)> = (1..=500).map(|d| (d, 1)).collect();
        merge_postings(&mut table, b"gone", &changes(&adds, &[]), 100).unwrap();
        let dels: Vec<DocId> = (1..=500).collect();
        let stats = merge_postings(&mut table, b"gone", &changes(&[], &dels), 100).unwrap();
        assert_eq!(stats, TermStats::default());
        assert!(table.is_empty());
    }

    #[test]
    fn absent_term_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let mut table = Table::create(dir.path(), "postlist", &config).unwrap();
        table.commit(1).unwrap();
        let mut pl = BrassPostList::open(Arc::new(table), "nothing", POLICY).unwrap();
        assert_eq!(pl.termfreq(), 0);
        pl.next().unwrap();
        assert!(pl.at_end());
    }
}
