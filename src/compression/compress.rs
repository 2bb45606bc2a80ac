use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::core::error::{Error, Result};

/// Raw DEFLATE (no zlib header) for B-tree tags.
pub struct TagCompressor {
    pub level: Compression,
    pub min_len: usize,
}

impl Default for TagCompressor {
    fn default() -> Self {
        TagCompressor {
            level: Compression::default(),
            min_len: 32,
        }
    }
}

impl TagCompressor {
    pub fn new(min_len: usize) -> Self {
        TagCompressor { min_len, ..Default::default() }
    }

    /// Compressed form of `tag`, or `None` if compressing doesn't shrink it.
    pub fn compress(&self, tag: &[u8]) -> Result<Option<Vec<u8>>> {
        if tag.len() < self.min_len {
            return Ok(None);
        }
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(tag.len() / 2), self.level);
        encoder.write_all(tag)?;
        let packed = encoder.finish()?;
        if packed.len() >= tag.len() {
            return Ok(None);
        }
        Ok(Some(packed))
    }

    pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 3);
        decoder.read_to_end(&mut out)
            .map_err(|e| Error::corrupt(format!("failed to inflate tag: {}", e)))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetitive_tag_shrinks_and_inflates() {
        let tag = b"abcabcabc".repeat(50);
        let packed = TagCompressor::default().compress(&tag).unwrap().unwrap();
        assert!(packed.len() < tag.len());
        assert_eq!(TagCompressor::decompress(&packed).unwrap(), tag);
    }

    #[test]
    fn short_or_random_tags_stay_raw() {
        let comp = TagCompressor::default();
        assert!(comp.compress(b"tiny").unwrap().is_none());
        let noise: Vec<u8> = (0..64u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        assert!(comp.compress(&noise).unwrap().is_none());
    }
}
