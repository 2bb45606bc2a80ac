//! Synonym lists: the term itself is the key and the tag is the sorted,
//! de-duplicated list of its synonyms, each length-prefixed.

use crate::compression::vbyte::{Unpacker, VByteEncoder};
use crate::core::error::{Error, Result};

pub fn synonym_key(term: &str) -> Result<Vec<u8>> {
    if term.is_empty() {
        return Err(Error::invalid_argument("empty synonym key"));
    }
    Ok(term.as_bytes().to_vec())
}

pub fn encode_synonyms(synonyms: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in synonyms {
        VByteEncoder::encode_bytes(&mut out, s.as_bytes());
    }
    out
}

pub fn decode_synonyms(tag: &[u8]) -> Result<Vec<String>> {
    let mut rd = Unpacker::new(tag);
    let mut out = Vec::new();
    while !rd.is_empty() {
        let raw = rd.bytes()?;
        out.push(String::from_utf8(raw.to_vec()).map_err(|_| Error::corrupt("synonym isn't UTF-8"))?);
    }
    Ok(out)
}

/// Insert into a sorted list; false if already present.
pub fn insert_sorted(list: &mut Vec<String>, synonym: &str) -> bool {
    match list.binary_search_by(|s| s.as_str().cmp(synonym)) {
        Ok(_) => false,
        Err(i) => {
            list.insert(i, synonym.to_string());
            true
        }
    }
}
