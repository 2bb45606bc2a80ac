use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{BlockNumber, Revision};

const BASE_MAGIC: &[u8; 8] = b"BRSXBASE";
const BASE_VERSION: u32 = 1;

/// Root record of one table revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableBase {
    pub revision: Revision,
    pub block_size: u32,
    pub root: Option<BlockNumber>,
    pub level: u8,
    pub item_count: u64,
    pub first_unused: BlockNumber,
    pub free: Vec<BlockNumber>,
    pub slab_len: u64,
    pub compress: bool,
    pub committed_at: DateTime<Utc>,
}

impl TableBase {
    pub fn empty(block_size: usize, compress: bool) -> Self {
        TableBase {
            revision: 0,
            block_size: block_size as u32,
            root: None,
            level: 0,
            item_count: 0,
            first_unused: 0,
            free: Vec::new(),
            slab_len: 0,
            compress,
            committed_at: Utc::now(),
        }
    }

    /// Base files alternate between two slots so the previous revision
    /// survives a crash while the next one is being written.
    pub fn path(table_path: &Path, revision: Revision) -> PathBuf {
        let slot = if revision % 2 == 0 { "baseA" } else { "baseB" };
        table_path.with_extension(slot)
    }

    pub fn save(&self, table_path: &Path) -> Result<()> {
        let payload = bincode::serialize(self)?;
        let mut data = Vec::with_capacity(payload.len() + 20);
        data.extend_from_slice(BASE_MAGIC);
        data.extend_from_slice(&BASE_VERSION.to_le_bytes());
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        data.extend_from_slice(&payload);

        let path = Self::path(table_path, self.revision);
        fs::write(&path, &data)?;
        fs::File::open(&path)?.sync_all()?;
        Ok(())
    }

    fn load_file(path: &Path) -> Result<TableBase> {
        let data = fs::read(path)?;
        if data.len() < 20 || &data[..8] != BASE_MAGIC {
            return Err(Error::new(ErrorKind::DatabaseOpening, format!("{}: not a base file", path.display())));
        }
        let version = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        if version != BASE_VERSION {
            return Err(Error::new(
                ErrorKind::DatabaseOpening,
                format!("{}: unsupported base version {}", path.display(), version),
            ));
        }
        let len = u32::from_le_bytes([data[12], data[13], data[14], data[15]]) as usize;
        let crc = u32::from_le_bytes([data[16], data[17], data[18], data[19]]);
        let payload = data.get(20..20 + len)
            .ok_or_else(|| Error::corrupt(format!("{}: truncated", path.display())))?;
        if crc32fast::hash(payload) != crc {
            return Err(Error::corrupt(format!("{}: checksum mismatch", path.display())));
        }
        Ok(bincode::deserialize(payload)?)
    }

    fn candidates(table_path: &Path) -> Vec<TableBase> {
        let mut candidates = Vec::new();
        for slot in ["baseA", "baseB"] {
            let path = table_path.with_extension(slot);
            if !path.exists() {
                continue;
            }
            match Self::load_file(&path) {
                Ok(base) => candidates.push(base),
                Err(e) => warn!("ignoring unreadable base file {}: {}", path.display(), e),
            }
        }
        candidates
    }

    /// Revisions with a valid base file, newest first.
    pub fn revisions(table_path: &Path) -> Vec<Revision> {
        let mut revs: Vec<Revision> = Self::candidates(table_path).iter().map(|b| b.revision).collect();
        revs.sort_unstable_by(|a, b| b.cmp(a));
        revs.dedup();
        revs
    }

    /// Newest valid base, or the one for `revision` if given.
    pub fn load(table_path: &Path, revision: Option<Revision>) -> Result<TableBase> {
        let candidates = Self::candidates(table_path);
        let chosen = match revision {
            Some(rev) => candidates.into_iter().find(|b| b.revision == rev),
            None => candidates.into_iter().max_by_key(|b| b.revision),
        };
        chosen.ok_or_else(|| {
            let what = match revision {
                Some(rev) => format!("revision {}", rev),
                None => "any revision".to_string(),
            };
            Error::new(
                ErrorKind::DatabaseOpening,
                format!("no valid base file for {} of {}", what, table_path.display()),
            )
        })
    }

    pub fn exists(table_path: &Path) -> bool {
        table_path.with_extension("baseA").exists() || table_path.with_extension("baseB").exists()
    }
}
