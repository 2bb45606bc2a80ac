use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Table layer
    pub block_size: usize,                 // power of two, 2 KiB to 64 KiB
    pub compress_tags: bool,               // raw DEFLATE when it shrinks the tag
    pub compress_min_len: usize,           // don't bother below this
    pub block_cache_blocks: usize,         // clean blocks kept per table
    pub dirty_block_limit: usize,          // flush dirty blocks early past this
    pub sequential_threshold: u32,         // forward inserts before packing splits
    pub max_inline_tag: usize,             // 0 = block_size / 4, larger tags go to the slab
    pub max_tag_size: usize,               // hard limit for a single tag

    // Postlist layer
    pub postlist_chunk_size: usize,        // target bytes per posting chunk
    pub flush_threshold: usize,            // pending documents before merging postings
    pub skip_large_gap: u32,               // docid gap that makes skip_to re-seek
    pub skip_large_freq: u32,              // ...but only for terms at least this frequent
}

impl Default for Config {
    fn default() -> Self {
        Config {
            block_size: 8192,
            compress_tags: true,
            compress_min_len: 32,
            block_cache_blocks: 256,
            dirty_block_limit: 1024,
            sequential_threshold: 4,
            max_inline_tag: 0,
            max_tag_size: 16 * 1024 * 1024,

            postlist_chunk_size: 2000,
            flush_threshold: 10_000,
            skip_large_gap: 2048,
            skip_large_freq: 256,
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two() || !(2048..=65536).contains(&self.block_size) {
            return Err(Error::invalid_argument(format!(
                "block size {} must be a power of two between 2048 and 65536",
                self.block_size
            )));
        }
        if self.postlist_chunk_size < 64 {
            return Err(Error::invalid_argument("postlist chunk size too small"));
        }
        if self.max_inline_tag > self.block_size / 4 {
            return Err(Error::invalid_argument(
                "max_inline_tag can't exceed a quarter of the block size",
            ));
        }
        Ok(())
    }

    /// Largest tag stored inline in a leaf item.
    pub fn inline_tag_limit(&self) -> usize {
        if self.max_inline_tag == 0 {
            self.block_size / 4
        } else {
            self.max_inline_tag
        }
    }
}
