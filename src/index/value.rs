//! Document values.
//!
//! The value table holds three kinds of entry:
//! * `S ++ be32(slot) ++ be32(docid)`: one value, so each slot is a
//!   docid-ordered stream;
//! * `D ++ be32(docid)`: every slot set for the document, as
//!   `[slot][value]` pairs, so a document's values can be found without
//!   knowing its slots;
//! * `V ++ be32(slot)`: `[freq][lower bound][upper bound]` for the slot.

use std::collections::BTreeMap;

use crate::backend::ValueStats;
use crate::compression::vbyte::{Unpacker, VByteEncoder};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, ValueSlot};

pub fn stream_key(slot: ValueSlot, did: DocId) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = b'S';
    key[1..5].copy_from_slice(&slot.to_be_bytes());
    key[5..].copy_from_slice(&did.to_be_bytes());
    key
}

pub fn stream_prefix(slot: ValueSlot) -> [u8; 5] {
    let mut key = [0u8; 5];
    key[0] = b'S';
    key[1..].copy_from_slice(&slot.to_be_bytes());
    key
}

/// Docid of a stream key for `slot`, or None once past the slot.
pub fn parse_stream_key(slot: ValueSlot, key: &[u8]) -> Option<DocId> {
    if key.len() != 9 || !key.starts_with(&stream_prefix(slot)) {
        return None;
    }
    Some(u32::from_be_bytes([key[5], key[6], key[7], key[8]]))
}

pub fn document_key(did: DocId) -> [u8; 5] {
    let mut key = [0u8; 5];
    key[0] = b'D';
    key[1..].copy_from_slice(&did.to_be_bytes());
    key
}

pub fn stats_key(slot: ValueSlot) -> [u8; 5] {
    let mut key = [0u8; 5];
    key[0] = b'V';
    key[1..].copy_from_slice(&slot.to_be_bytes());
    key
}

pub fn encode_document_values(values: &BTreeMap<ValueSlot, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    for (slot, value) in values {
        VByteEncoder::encode_u32(&mut out, *slot);
        VByteEncoder::encode_bytes(&mut out, value);
    }
    out
}

pub fn decode_document_values(tag: &[u8]) -> Result<BTreeMap<ValueSlot, Vec<u8>>> {
    let mut rd = Unpacker::new(tag);
    let mut values = BTreeMap::new();
    while !rd.is_empty() {
        let slot = rd.uint()?;
        let value = rd.bytes()?.to_vec();
        if values.insert(slot, value).is_some() {
            return Err(Error::corrupt(format!("slot {} appears twice in a document", slot)));
        }
    }
    Ok(values)
}

pub fn encode_stats(stats: &ValueStats) -> Vec<u8> {
    let mut out = Vec::new();
    VByteEncoder::encode_u32(&mut out, stats.freq);
    VByteEncoder::encode_bytes(&mut out, &stats.lower_bound);
    VByteEncoder::encode_bytes(&mut out, &stats.upper_bound);
    out
}

pub fn decode_stats(tag: &[u8]) -> Result<ValueStats> {
    let mut rd = Unpacker::new(tag);
    Ok(ValueStats {
        freq: rd.uint()?,
        lower_bound: rd.bytes()?.to_vec(),
        upper_bound: rd.bytes()?.to_vec(),
    })
}

impl ValueStats {
    /// Account for a value being stored.
    pub fn add(&mut self, value: &[u8]) {
        if self.freq == 0 {
            self.lower_bound = value.to_vec();
            self.upper_bound = value.to_vec();
        } else {
            if value < self.lower_bound.as_slice() {
                self.lower_bound = value.to_vec();
            }
            if value > self.upper_bound.as_slice() {
                self.upper_bound = value.to_vec();
            }
        }
        self.freq += 1;
    }

    /// Account for a value being removed. The bounds aren't tightened, so
    /// they may end up looser than the values actually stored.
    pub fn remove(&mut self) {
        self.freq = self.freq.saturating_sub(1);
        if self.freq == 0 {
            self.lower_bound.clear();
            self.upper_bound.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_keys_order_by_slot_then_docid() {
        assert!(stream_key(1, 900) < stream_key(2, 1));
        assert!(stream_key(1, 2) < stream_key(1, 256));
        assert_eq!(parse_stream_key(1, &stream_key(1, 77)), Some(77));
        assert_eq!(parse_stream_key(1, &stream_key(2, 77)), None);
    }

    #[test]
    fn stats_widen_and_reset() {
        let mut stats = ValueStats::default();
        stats.add(b"m");
        stats.add(b"c");
        stats.add(b"x");
        assert_eq!((stats.lower_bound.as_slice(), stats.upper_bound.as_slice()), (&b"c"[..], &b"x"[..]));
        assert_eq!(decode_stats(&encode_stats(&stats)).unwrap(), stats);
        stats.remove();
        stats.remove();
        stats.remove();
        assert_eq!(stats, ValueStats::default());
    }

    #[test]
    fn document_values_round_trip() {
        let mut values = BTreeMap::new();
        values.insert(0, b"zero".to_vec());
        values.insert(40, vec![0, 255]);
        assert_eq!(decode_document_values(&encode_document_values(&values)).unwrap(), values);
    }
}
