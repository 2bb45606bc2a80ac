use crate::core::types::DocId;

/// Document data lives in the record table under the big-endian docid, so
/// a cursor walk visits documents in docid order.
pub fn record_key(did: DocId) -> [u8; 4] {
    did.to_be_bytes()
}

pub fn parse_record_key(key: &[u8]) -> Option<DocId> {
    <[u8; 4]>::try_from(key).ok().map(u32::from_be_bytes)
}
