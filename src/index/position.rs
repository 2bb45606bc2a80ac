//! Position lists, keyed by `be32(docid) ++ term`.
//!
//! The tag starts with the last position as a varint. A single position
//! needs nothing more. Otherwise a bitstream follows holding the first
//! position (out of `last + 1`), the count less two (out of
//! `last - first`), then the inner positions coded interpolatively.

use crate::backend::PositionList;
use crate::compression::bitstream::{BitReader, BitWriter};
use crate::compression::vbyte::{Unpacker, VByteEncoder};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, TermCount, TermPos};

pub fn position_key(did: DocId, term: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + term.len());
    key.extend_from_slice(&did.to_be_bytes());
    key.extend_from_slice(term.as_bytes());
    key
}

/// Key prefix covering every position list of a document.
pub fn document_prefix(did: DocId) -> [u8; 4] {
    did.to_be_bytes()
}

/// `positions` must be strictly increasing and non-empty.
pub fn encode_positions(positions: &[TermPos]) -> Vec<u8> {
    let mut out = Vec::new();
    let Some(&last) = positions.last() else {
        return out;
    };
    VByteEncoder::encode_u32(&mut out, last);
    if positions.len() == 1 {
        return out;
    }
    let first = positions[0];
    let mut wr = BitWriter::with_prefix(out);
    wr.encode(first, last + 1);
    wr.encode((positions.len() - 2) as TermPos, last - first);
    wr.encode_interpolative(positions, 0, positions.len() - 1);
    wr.freeze()
}

/// Lazily decoded position list read from a tag.
#[derive(Debug, Clone)]
pub struct EncodedPositionList {
    reader: Option<BitReader<Vec<u8>>>,
    size: TermCount,
    first: TermPos,
    last: TermPos,
    current: TermPos,
    /// Positions handed out so far.
    seen: TermCount,
    at_end: bool,
}

impl EncodedPositionList {
    pub fn empty() -> Self {
        EncodedPositionList { reader: None, size: 0, first: 0, last: 0, current: 0, seen: 0, at_end: false }
    }

    pub fn decode(tag: &[u8]) -> Result<Self> {
        if tag.is_empty() {
            return Ok(Self::empty());
        }
        let mut rd = Unpacker::new(tag);
        let last = rd.uint()?;
        let rest = rd.rest();
        if rest.is_empty() {
            return Ok(EncodedPositionList {
                reader: None, size: 1, first: last, last, current: 0, seen: 0, at_end: false,
            });
        }
        let mut bits = BitReader::new(rest.to_vec());
        let first = bits.decode(last + 1)?;
        if first >= last {
            return Err(Error::corrupt("position list's first position isn't below its last"));
        }
        let size = bits.decode(last - first)? + 2;
        bits.decode_interpolative(0, size as usize - 1, first, last);
        Ok(EncodedPositionList {
            reader: Some(bits), size, first, last, current: 0, seen: 0, at_end: false,
        })
    }

    /// Every position, decoded eagerly.
    pub fn to_vec(mut self) -> Result<Vec<TermPos>> {
        let mut out = Vec::with_capacity(self.size as usize);
        while self.next()? {
            out.push(self.current);
        }
        Ok(out)
    }
}

impl PositionList for EncodedPositionList {
    fn size(&self) -> TermCount {
        self.size
    }

    fn position(&self) -> TermPos {
        self.current
    }

    fn at_end(&self) -> bool {
        self.at_end
    }

    fn next(&mut self) -> Result<bool> {
        if self.at_end {
            return Ok(false);
        }
        if self.seen >= self.size {
            self.at_end = true;
            return Ok(false);
        }
        self.current = if self.seen == 0 {
            self.first
        } else if self.seen + 1 == self.size {
            self.last
        } else {
            match self.reader.as_mut() {
                Some(reader) => reader.decode_interpolative_next()?,
                None => return Err(Error::corrupt("position list body missing")),
            }
        };
        self.seen += 1;
        Ok(true)
    }

    fn skip_to(&mut self, pos: TermPos) -> Result<bool> {
        if self.seen > 0 && !self.at_end && self.current >= pos {
            return Ok(true);
        }
        if pos > self.last {
            self.seen = self.size;
            self.at_end = true;
            return Ok(false);
        }
        while self.next()? {
            if self.current >= pos {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(positions: &[TermPos]) -> Vec<TermPos> {
        EncodedPositionList::decode(&encode_positions(positions)).unwrap().to_vec().unwrap()
    }

    #[test]
    fn lists_of_various_shapes_decode_back() {
        assert_eq!(round_trip(&[7]), vec![7]);
        assert_eq!(round_trip(&[0, 1]), vec![0, 1]);
        assert_eq!(round_trip(&[3, 4, 5, 6, 7]), vec![3, 4, 5, 6, 7]);
        let sparse = [1, 17, 18, 400, 401, 9000, 65000];
        assert_eq!(round_trip(&sparse), sparse.to_vec());
    }

    #[test]
    fn single_position_is_header_only() {
        assert_eq!(encode_positions(&[300]).len(), 2);
    }

    #[test]
    fn skip_to_lands_on_next_position() {
        let tag = encode_positions(&[2, 10, 11, 40]);
        let mut pl = EncodedPositionList::decode(&tag).unwrap();
        assert_eq!(pl.size(), 4);
        assert!(pl.skip_to(11).unwrap());
        assert_eq!(pl.position(), 11);
        assert!(pl.skip_to(12).unwrap());
        assert_eq!(pl.position(), 40);
        assert!(!pl.skip_to(41).unwrap());
        assert!(pl.at_end());
    }

    #[test]
    fn keys_group_by_document() {
        let a = position_key(2, "zebra");
        let b = position_key(3, "apple");
        assert!(a < b);
        assert!(a.starts_with(&document_prefix(2)));
    }
}
