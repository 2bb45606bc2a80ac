//! Posting chunk codec and postlist table keys.
//!
//! A term's postings are split into chunks stored under
//! `sortable(term) ++ be32(first_did)`, except the first chunk whose key is
//! the bare `sortable(term)`. The first chunk starts with
//! `[termfreq][collfreq][first_did - 1]`; every chunk then holds
//! `[is_last][last_did - first_did]` followed by the entries, `[wdf]` for
//! the first one and `[did_delta - 1][wdf]` for the rest.
//!
//! The document length stream is the postlist of the empty term. Its
//! "wdf" is the document length and each entry also carries the number of
//! unique terms in the document.

use crate::compression::vbyte::{Unpacker, VByteEncoder};
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, DocId, TermCount};

/// Key of the collection statistics record.
pub const STATS_KEY: &[u8] = b"\0\x01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Posting {
    pub did: DocId,
    pub wdf: TermCount,
    /// Unique term count, only meaningful in the document length stream.
    pub uniq: TermCount,
}

impl Posting {
    pub fn new(did: DocId, wdf: TermCount) -> Self {
        Posting { did, wdf, uniq: 0 }
    }
}

/// Term statistics kept in the header of a term's first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TermStats {
    pub termfreq: DocCount,
    pub collfreq: u64,
}

/// A decoded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub first: DocId,
    pub last: DocId,
    pub is_last: bool,
    pub postings: Vec<Posting>,
}

impl Chunk {
    /// Index of the first posting with docid >= `did`.
    pub fn lower_bound(&self, did: DocId) -> usize {
        self.postings.partition_point(|p| p.did < did)
    }
}

pub fn postlist_key(term: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(term.len() + 2);
    VByteEncoder::encode_sortable(&mut key, term, false);
    key
}

pub fn chunk_key(term: &[u8], first: DocId) -> Vec<u8> {
    let mut key = postlist_key(term);
    key.extend_from_slice(&first.to_be_bytes());
    key
}

/// Split a postlist table key into its term and, for non-first chunks, the
/// chunk's first docid. Returns None for reserved keys.
pub fn parse_key(key: &[u8]) -> Result<Option<(Vec<u8>, Option<DocId>)>> {
    if key.len() >= 2 && key[0] == 0 && key[1] != 0 && key[1] != 0xff {
        return Ok(None);
    }
    let mut rd = Unpacker::new(key);
    let term = rd.sortable(false)?;
    if rd.is_empty() {
        return Ok(Some((term, None)));
    }
    let did = rd.be_u32()?;
    if !rd.is_empty() {
        return Err(Error::corrupt("trailing bytes in postlist key"));
    }
    Ok(Some((term, Some(did))))
}

/// Encode one chunk. `stats` is given for the first chunk of a term only.
pub fn encode_chunk(stats: Option<TermStats>, postings: &[Posting], is_last: bool, with_uniq: bool) -> Vec<u8> {
    debug_assert!(!postings.is_empty());
    let first = postings[0].did;
    let last = postings[postings.len() - 1].did;
    let mut out = Vec::with_capacity(postings.len() * 3 + 12);
    if let Some(stats) = stats {
        VByteEncoder::encode_u32(&mut out, stats.termfreq);
        VByteEncoder::encode_u64(&mut out, stats.collfreq);
        VByteEncoder::encode_u32(&mut out, first - 1);
    }
    out.push(is_last as u8);
    VByteEncoder::encode_u32(&mut out, last - first);
    let mut prev = None;
    for p in postings {
        if let Some(prev) = prev {
            VByteEncoder::encode_u32(&mut out, p.did - prev - 1);
        }
        VByteEncoder::encode_u32(&mut out, p.wdf);
        if with_uniq {
            VByteEncoder::encode_u32(&mut out, p.uniq);
        }
        prev = Some(p.did);
    }
    out
}

/// Read the statistics header of a first chunk.
pub fn decode_stats(tag: &[u8]) -> Result<TermStats> {
    let mut rd = Unpacker::new(tag);
    Ok(TermStats { termfreq: rd.uint()?, collfreq: rd.uint64()? })
}

/// Decode a chunk. `first_did` comes from the key for non-first chunks and
/// is None for a first chunk, whose header supplies it.
pub fn decode_chunk(tag: &[u8], first_did: Option<DocId>, with_uniq: bool) -> Result<(Option<TermStats>, Chunk)> {
    let mut rd = Unpacker::new(tag);
    let (stats, first) = match first_did {
        Some(did) => (None, did),
        None => {
            let stats = TermStats { termfreq: rd.uint()?, collfreq: rd.uint64()? };
            let first = rd.uint()?.checked_add(1)
                .ok_or_else(|| Error::corrupt("first docid overflows"))?;
            (Some(stats), first)
        }
    };
    let is_last = match rd.byte()? {
        0 => false,
        1 => true,
        other => return Err(Error::corrupt(format!("bad last-chunk flag {}", other))),
    };
    let last = rd.uint()?.checked_add(first)
        .ok_or_else(|| Error::corrupt("last docid overflows"))?;

    let mut postings = Vec::new();
    let mut did = first;
    while !rd.is_empty() {
        if !postings.is_empty() {
            let delta = rd.uint()?;
            did = did.checked_add(delta).and_then(|d| d.checked_add(1))
                .ok_or_else(|| Error::corrupt("docid delta overflows"))?;
        }
        let wdf = rd.uint()?;
        let uniq = if with_uniq { rd.uint()? } else { 0 };
        postings.push(Posting { did, wdf, uniq });
    }
    if postings.is_empty() {
        return Err(Error::corrupt("empty posting chunk"));
    }
    if did != last {
        return Err(Error::corrupt(format!(
            "posting chunk says it ends at {} but its entries end at {}", last, did
        )));
    }
    Ok((stats, Chunk { first, last, is_last, postings }))
}

/// Cut `postings` into runs whose encoding stays near `target` bytes.
pub fn split_postings(postings: &[Posting], target: usize, with_uniq: bool) -> Vec<&[Posting]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut size = 0usize;
    let mut scratch = Vec::with_capacity(10);
    for i in 0..postings.len() {
        scratch.clear();
        if i > start {
            VByteEncoder::encode_u32(&mut scratch, postings[i].did - postings[i - 1].did - 1);
        }
        VByteEncoder::encode_u32(&mut scratch, postings[i].wdf);
        if with_uniq {
            VByteEncoder::encode_u32(&mut scratch, postings[i].uniq);
        }
        if size + scratch.len() > target && i > start {
            pieces.push(&postings[start..i]);
            start = i;
            // The first entry of a chunk has no delta.
            size = scratch.len().saturating_sub(1);
            continue;
        }
        size += scratch.len();
    }
    if start < postings.len() {
        pieces.push(&postings[start..]);
    }
    pieces
}

/// Collection-wide statistics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionStats {
    pub last_docid: DocId,
    pub doclen_lbound: TermCount,
    pub doclen_ubound: TermCount,
    pub wdf_ubound: TermCount,
}

impl CollectionStats {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        VByteEncoder::encode_u32(&mut out, self.last_docid);
        VByteEncoder::encode_u32(&mut out, self.doclen_lbound);
        VByteEncoder::encode_u32(&mut out, self.doclen_ubound - self.doclen_lbound);
        VByteEncoder::encode_u32(&mut out, self.wdf_ubound);
        out
    }

    pub fn decode(tag: &[u8]) -> Result<Self> {
        let mut rd = Unpacker::new(tag);
        let last_docid = rd.uint()?;
        let doclen_lbound = rd.uint()?;
        let doclen_ubound = doclen_lbound.checked_add(rd.uint()?)
            .ok_or_else(|| Error::corrupt("doclen upper bound overflows"))?;
        let wdf_ubound = rd.uint()?;
        Ok(CollectionStats { last_docid, doclen_lbound, doclen_ubound, wdf_ubound })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postings(dids: &[DocId]) -> Vec<Posting> {
        dids.iter().map(|&d| Posting::new(d, d % 5 + 1)).collect()
    }

    #[test]
    fn first_chunk_carries_stats_and_docid() {
        let ps = postings(&[3, 4, 10, 200]);
        let stats = TermStats { termfreq: 4, collfreq: 16 };
        let tag = encode_chunk(Some(stats), &ps, true, false);
        let (got_stats, chunk) = decode_chunk(&tag, None, false).unwrap();
        assert_eq!(got_stats, Some(stats));
        assert_eq!(chunk.first, 3);
        assert_eq!(chunk.last, 200);
        assert!(chunk.is_last);
        assert_eq!(chunk.postings, ps);
        assert_eq!(decode_stats(&tag).unwrap(), stats);
        assert_eq!(chunk.lower_bound(5), 2);
    }

    #[test]
    fn truncated_chunk_is_corrupt() {
        let ps = postings(&[1, 2, 3]);
        let tag = encode_chunk(None, &ps, false, false);
        assert!(decode_chunk(&tag[..tag.len() - 2], Some(1), false).is_err());
    }

    #[test]
    fn doclen_entries_keep_unique_counts() {
        let ps = vec![Posting { did: 1, wdf: 7, uniq: 3 }, Posting { did: 9, wdf: 2, uniq: 2 }];
        let tag = encode_chunk(None, &ps, true, true);
        let (_, chunk) = decode_chunk(&tag, Some(1), true).unwrap();
        assert_eq!(chunk.postings, ps);
    }

    #[test]
    fn keys_sort_by_term_then_docid() {
        let a = postlist_key(b"cat");
        let b = chunk_key(b"cat", 5);
        let c = chunk_key(b"cat", 300);
        let d = postlist_key(b"cats");
        assert!(a < b && b < c && c < d);
        assert_eq!(parse_key(&c).unwrap(), Some((b"cat".to_vec(), Some(300))));
        assert_eq!(parse_key(&a).unwrap(), Some((b"cat".to_vec(), None)));
        assert_eq!(parse_key(STATS_KEY).unwrap(), None);
        assert_eq!(parse_key(&postlist_key(b"")).unwrap(), Some((Vec::new(), None)));
    }

    #[test]
    fn splitting_respects_target_size() {
        let ps: Vec<Posting> = (1..=1000).map(|d| Posting::new(d * 3, 1)).collect();
        let pieces = split_postings(&ps, 100, false);
        assert!(pieces.len() > 5);
        assert_eq!(pieces.iter().map(|p| p.len()).sum::<usize>(), 1000);
        for piece in &pieces {
            assert!(encode_chunk(None, piece, false, false).len() <= 100 + 8);
        }
    }

    #[test]
    fn collection_stats_round_trip() {
        let stats = CollectionStats { last_docid: 99, doclen_lbound: 3, doclen_ubound: 120, wdf_ubound: 17 };
        assert_eq!(CollectionStats::decode(&stats.encode()).unwrap(), stats);
    }
}
