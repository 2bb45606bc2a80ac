//! Termlist entries, keyed by `be32(docid)`.
//!
//! Tag: `[doclen][unique terms]` then for each term in byte order
//! `[bytes shared with the previous term][suffix length][suffix][wdf]`.

use crate::backend::TermListEntry;
use crate::compression::vbyte::{Unpacker, VByteEncoder};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, TermCount};

pub fn termlist_key(did: DocId) -> [u8; 4] {
    did.to_be_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredTermList {
    pub doclen: TermCount,
    pub entries: Vec<TermListEntry>,
}

impl StoredTermList {
    pub fn unique_terms(&self) -> TermCount {
        self.entries.len() as TermCount
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.entries.len() * 8);
        VByteEncoder::encode_u32(&mut out, self.doclen);
        VByteEncoder::encode_u32(&mut out, self.unique_terms());
        let mut prev: &[u8] = &[];
        for entry in &self.entries {
            let term = entry.term.as_bytes();
            let shared = prev.iter().zip(term).take_while(|(a, b)| a == b).count();
            VByteEncoder::encode_u32(&mut out, shared as u32);
            VByteEncoder::encode_bytes(&mut out, &term[shared..]);
            VByteEncoder::encode_u32(&mut out, entry.wdf);
            prev = term;
        }
        out
    }

    pub fn decode(tag: &[u8]) -> Result<Self> {
        let mut rd = Unpacker::new(tag);
        let doclen = rd.uint()?;
        let count = rd.uint()? as usize;
        let mut entries: Vec<TermListEntry> = Vec::with_capacity(count);
        let mut term: Vec<u8> = Vec::new();
        for _ in 0..count {
            let shared = rd.uint()? as usize;
            if shared > term.len() {
                return Err(Error::corrupt("termlist entry shares more than the previous term"));
            }
            term.truncate(shared);
            term.extend_from_slice(rd.bytes()?);
            let wdf = rd.uint()?;
            let text = String::from_utf8(term.clone())
                .map_err(|_| Error::corrupt("termlist holds a term which isn't UTF-8"))?;
            entries.push(TermListEntry { term: text, wdf });
        }
        if !rd.is_empty() {
            return Err(Error::corrupt("trailing data in termlist"));
        }
        Ok(StoredTermList { doclen, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_prefixes_are_stripped() {
        let tl = StoredTermList {
            doclen: 6,
            entries: vec![
                TermListEntry { term: "index".into(), wdf: 1 },
                TermListEntry { term: "indexer".into(), wdf: 2 },
                TermListEntry { term: "indices".into(), wdf: 3 },
            ],
        };
        let tag = tl.encode();
        assert!(tag.len() < 2 + "indexindexerindices".len() + 9);
        assert_eq!(StoredTermList::decode(&tag).unwrap(), tl);
    }
}
