//! Copy-on-write B-tree over a file of fixed-size blocks.
//!
//! A `Table` opened read-only is a snapshot of one committed revision and
//! can be shared between threads; its reads go through an LRU block cache
//! using positional reads. A writable `Table` builds the next revision:
//! the first time a block from an older revision is modified it is copied
//! to a freshly allocated block, so the committed tree stays intact until
//! the new base file is written by `commit()`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, trace};
use lru::LruCache;
use parking_lot::Mutex;

use crate::compression::compress::TagCompressor;
use crate::compression::vbyte::{Unpacker, VByteEncoder};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{BlockNumber, Revision};
use crate::storage::base::TableBase;
use crate::storage::block::{
    divide, encode_branch_item, encode_leaf_item, leaf_item_key, Block, LeafItem, HEADER_SIZE,
    MAX_KEY_LEN,
};
use crate::storage::cursor::TableCursor;
use crate::storage::freelist::FreeList;
use crate::storage::io::{read_exact_at, write_all_at};

/// One step of a root-to-leaf path: block number and the branch slot
/// followed (unused for the leaf).
type PathStep = (BlockNumber, isize);

pub struct Table {
    name: String,
    path: PathBuf,
    file: File,
    slab: Option<File>,
    config: Config,
    block_size: usize,
    writable: bool,
    compressor: Option<TagCompressor>,

    base: TableBase,
    root: Option<BlockNumber>,
    level: u8,
    item_count: u64,
    /// Snapshot revision for readers, revision being built for writers.
    revision: Revision,
    freelist: FreeList,
    slab_len: u64,

    dirty: HashMap<BlockNumber, Arc<Block>>,
    cache: Mutex<LruCache<BlockNumber, Arc<Block>>>,

    last_key: Vec<u8>,
    forward_run: u32,
    modified: bool,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("revision", &self.revision)
            .field("root", &self.root)
            .field("items", &self.item_count)
            .finish()
    }
}

fn table_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.DB", name))
}

impl Table {
    /// Create an empty table, replacing any existing one, and commit
    /// revision 0 for it.
    pub fn create(dir: &Path, name: &str, config: &Config) -> Result<Table> {
        config.validate()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(table_file(dir, name))
            .map_err(|e| Error::new(ErrorKind::DatabaseOpening, format!("can't create table {}: {}", name, e)))?;
        let base = TableBase::empty(config.block_size, config.compress_tags);
        let path = dir.join(name);
        for stale in ["baseA", "baseB", "slab"] {
            let p = path.with_extension(stale);
            if p.exists() {
                std::fs::remove_file(p)?;
            }
        }
        base.save(&path)?;
        debug!("created table {} with {} byte blocks", name, config.block_size);
        Self::from_base(dir, name, file, base, config, true)
    }

    /// Open an existing table at the newest revision, or at `revision`.
    pub fn open(
        dir: &Path,
        name: &str,
        config: &Config,
        revision: Option<Revision>,
        writable: bool,
    ) -> Result<Table> {
        let path = dir.join(name);
        let base = TableBase::load(&path, revision)?;
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(table_file(dir, name))
            .map_err(|e| Error::new(ErrorKind::DatabaseOpening, format!("can't open table {}: {}", name, e)))?;
        Self::from_base(dir, name, file, base, config, writable)
    }

    pub fn exists(dir: &Path, name: &str) -> bool {
        table_file(dir, name).exists() && TableBase::exists(&dir.join(name))
    }

    fn from_base(
        dir: &Path,
        name: &str,
        file: File,
        base: TableBase,
        config: &Config,
        writable: bool,
    ) -> Result<Table> {
        let block_size = base.block_size as usize;
        if !block_size.is_power_of_two() || !(2048..=65536).contains(&block_size) {
            return Err(Error::corrupt(format!("table {}: bad block size {}", name, block_size)));
        }
        let path = dir.join(name);
        let slab_path = path.with_extension("slab");
        let slab = if writable {
            Some(OpenOptions::new().read(true).write(true).create(true).open(&slab_path)?)
        } else if slab_path.exists() {
            Some(File::open(&slab_path)?)
        } else {
            None
        };
        let compressor = if base.compress {
            Some(TagCompressor::new(config.compress_min_len))
        } else {
            None
        };
        let cache_size = NonZeroUsize::new(config.block_cache_blocks.max(1)).unwrap_or(NonZeroUsize::MIN);
        let revision = if writable { base.revision + 1 } else { base.revision };

        Ok(Table {
            name: name.to_string(),
            path,
            file,
            slab,
            config: config.clone(),
            block_size,
            writable,
            compressor,
            root: base.root,
            level: base.level,
            item_count: base.item_count,
            revision,
            freelist: FreeList::new(base.first_unused, base.free.iter().copied()),
            slab_len: base.slab_len,
            base,
            dirty: HashMap::new(),
            cache: Mutex::new(LruCache::new(cache_size)),
            last_key: Vec::new(),
            forward_run: 0,
            modified: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn root(&self) -> Option<BlockNumber> {
        self.root
    }

    /// Number of levels; 0 for an empty table.
    pub fn height(&self) -> u32 {
        match self.root {
            Some(_) => self.level as u32 + 1,
            None => 0,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// Last committed revision.
    pub fn revision(&self) -> Revision {
        self.base.revision
    }

    /// Revision stamped on blocks written by this handle.
    pub fn working_revision(&self) -> Revision {
        self.revision
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn base(&self) -> &TableBase {
        &self.base
    }

    pub fn first_unused_block(&self) -> BlockNumber {
        self.freelist.first_unused()
    }

    pub fn free_blocks(&self) -> Vec<BlockNumber> {
        self.freelist.free_blocks().collect()
    }

    pub fn cursor(&self) -> TableCursor<&Table> {
        TableCursor::new(self)
    }

    pub(crate) fn read_block(&self, n: BlockNumber) -> Result<Arc<Block>> {
        if let Some(block) = self.dirty.get(&n) {
            return Ok(block.clone());
        }
        if let Some(block) = self.cache.lock().get(&n) {
            return Ok(block.clone());
        }
        if n >= self.freelist.first_unused() {
            return Err(Error::corrupt(format!(
                "table {}: block {} is past the end of the table", self.name, n
            )));
        }
        let mut buf = vec![0u8; self.block_size];
        read_exact_at(&self.file, &mut buf, n as u64 * self.block_size as u64)?;
        let block = Block::from_bytes(n, buf)?;
        if block.revision() > self.revision {
            if self.writable {
                return Err(Error::corrupt(format!(
                    "table {}: block {} has revision {} beyond {}",
                    self.name, n, block.revision(), self.revision
                )));
            }
            return Err(Error::new(
                ErrorKind::DatabaseModified,
                format!("table {} was modified after revision {} was opened", self.name, self.revision),
            ));
        }
        trace!("table {}: read block {}", self.name, n);
        let block = Arc::new(block);
        self.cache.lock().put(n, block.clone());
        Ok(block)
    }

    /// Descend to the leaf which would hold `key`.
    fn find_leaf_block(&self, key: &[u8]) -> Result<Option<Arc<Block>>> {
        let Some(mut n) = self.root else {
            return Ok(None);
        };
        let mut expected_level = self.level;
        loop {
            let block = self.read_block(n)?;
            if block.level() != expected_level {
                return Err(Error::corrupt(format!(
                    "table {}: block {} at level {} where {} expected",
                    self.name, n, block.level(), expected_level
                )));
            }
            if block.is_leaf() {
                return Ok(Some(block));
            }
            n = block.child(block.find_child(key));
            expected_level -= 1;
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Ok(None);
        }
        let Some(leaf) = self.find_leaf_block(key)? else {
            return Ok(None);
        };
        match leaf.find_leaf(key) {
            Ok(i) => Ok(Some(self.read_tag(&leaf.leaf_item(i))?)),
            Err(_) => Ok(None),
        }
    }

    pub fn key_exists(&self, key: &[u8]) -> Result<bool> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Ok(false);
        }
        match self.find_leaf_block(key)? {
            Some(leaf) => Ok(leaf.find_leaf(key).is_ok()),
            None => Ok(false),
        }
    }

    /// Every key starting with `prefix`, in order.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        let mut cursor = self.cursor();
        let mut more = if prefix.is_empty() {
            cursor.next()?
        } else {
            cursor.seek_ge(prefix)?;
            !cursor.after_end()
        };
        while more {
            match cursor.key() {
                Some(key) if key.starts_with(prefix) => keys.push(key.to_vec()),
                _ => break,
            }
            more = cursor.next()?;
        }
        Ok(keys)
    }

    pub(crate) fn read_tag(&self, item: &LeafItem<'_>) -> Result<Vec<u8>> {
        let raw = if item.slab {
            let mut rd = Unpacker::new(item.tag);
            let offset = rd.uint64()?;
            let len = rd.uint64()? as usize;
            let slab = self.slab.as_ref()
                .ok_or_else(|| Error::corrupt(format!("table {}: slab file missing", self.name)))?;
            if offset + len as u64 > self.base.slab_len.max(self.slab_len) {
                return Err(Error::corrupt(format!("table {}: slab reference past end", self.name)));
            }
            let mut buf = vec![0u8; len];
            read_exact_at(slab, &mut buf, offset)?;
            buf
        } else {
            item.tag.to_vec()
        };
        if item.compressed {
            TagCompressor::decompress(&raw)
        } else {
            Ok(raw)
        }
    }

    // ---- writing -------------------------------------------------------

    fn check_writable(&self) -> Result<()> {
        if !self.writable {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("table {} is open read-only", self.name),
            ));
        }
        Ok(())
    }

    fn check_key(key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("empty keys aren't allowed"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(Error::invalid_argument(format!(
                "key too long: {} bytes, limit is {}", key.len(), MAX_KEY_LEN
            )));
        }
        Ok(())
    }

    /// Largest item (plus its offset) that keeps a half-full block able to
    /// take another after a split.
    fn max_item_len(&self) -> usize {
        (self.block_size - HEADER_SIZE - 4) / 4 - 2
    }

    fn usable(&self, leaf: bool) -> usize {
        if leaf {
            self.block_size - HEADER_SIZE
        } else {
            self.block_size - HEADER_SIZE - 4
        }
    }

    fn dirty_mut(&mut self, n: BlockNumber) -> Result<&mut Block> {
        let name = &self.name;
        self.dirty
            .get_mut(&n)
            .map(Arc::make_mut)
            .ok_or_else(|| Error::new(ErrorKind::Internal, format!("table {}: block {} isn't dirty", name, n)))
    }

    fn release_block(&mut self, n: BlockNumber, revision: Revision) {
        self.dirty.remove(&n);
        self.cache.lock().pop(&n);
        if revision == self.revision {
            self.freelist.release_now(n);
        } else {
            self.freelist.release_after_commit(n);
        }
    }

    /// Make block `n` modifiable in the revision being built, copying it if
    /// it belongs to a committed revision. Returns the block's new number.
    fn make_writable(&mut self, n: BlockNumber) -> Result<BlockNumber> {
        if self.dirty.contains_key(&n) {
            return Ok(n);
        }
        let block = self.read_block(n)?;
        if block.revision() == self.revision {
            // Written earlier in this revision and flushed.
            self.cache.lock().pop(&n);
            self.dirty.insert(n, block);
            return Ok(n);
        }
        let new_n = self.freelist.allocate();
        let mut copy = (*block).clone();
        copy.n = new_n;
        copy.set_revision(self.revision);
        self.freelist.release_after_commit(n);
        self.cache.lock().pop(&n);
        self.dirty.insert(new_n, Arc::new(copy));
        trace!("table {}: block {} cloned to {}", self.name, n, new_n);
        Ok(new_n)
    }

    /// Writable root-to-leaf path for `key`.
    fn writable_path(&mut self, key: &[u8]) -> Result<Vec<PathStep>> {
        let Some(root) = self.root else {
            return Err(Error::new(ErrorKind::Internal, "writable_path on empty table"));
        };
        let mut n = self.make_writable(root)?;
        self.root = Some(n);
        let mut path = Vec::with_capacity(self.level as usize + 1);
        loop {
            let (leaf, c, child) = {
                let block = self.dirty_mut(n)?;
                if block.is_leaf() {
                    (true, 0, 0)
                } else {
                    let c = block.find_child(key);
                    (false, c, block.child(c))
                }
            };
            path.push((n, c));
            if leaf {
                return Ok(path);
            }
            let child_w = self.make_writable(child)?;
            if child_w != child {
                self.dirty_mut(n)?.set_child(c, child_w);
            }
            n = child_w;
        }
    }

    fn note_key(&mut self, key: &[u8]) {
        if key > self.last_key.as_slice() {
            self.forward_run = self.forward_run.saturating_add(1);
        } else {
            self.forward_run = 0;
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
    }

    fn sequential(&self) -> bool {
        self.forward_run >= self.config.sequential_threshold
    }

    fn write_slab(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let slab = self.slab.as_ref()
            .ok_or_else(|| Error::new(ErrorKind::Internal, "no slab file"))?;
        let offset = self.slab_len;
        write_all_at(slab, data, offset)?;
        self.slab_len += data.len() as u64;
        let mut reference = Vec::new();
        VByteEncoder::encode_u64(&mut reference, offset);
        VByteEncoder::encode_u64(&mut reference, data.len() as u64);
        Ok(reference)
    }

    /// Insert or replace the tag stored under `key`.
    pub fn add(&mut self, key: &[u8], tag: &[u8]) -> Result<()> {
        self.check_writable()?;
        Self::check_key(key)?;
        if tag.len() > self.config.max_tag_size {
            return Err(Error::unimplemented(format!(
                "tag of {} bytes exceeds the {} byte limit", tag.len(), self.config.max_tag_size
            )));
        }

        let packed = match &self.compressor {
            Some(comp) => comp.compress(tag)?,
            None => None,
        };
        let compressed = packed.is_some();
        let payload = packed.as_deref().unwrap_or(tag);
        let mut item = encode_leaf_item(key, payload, compressed, false);
        if item.len() > self.max_item_len() || payload.len() > self.config.inline_tag_limit() {
            let reference = self.write_slab(payload)?;
            item = encode_leaf_item(key, &reference, compressed, true);
        }

        self.note_key(key);
        self.modified = true;

        if self.root.is_none() {
            let n = self.freelist.allocate();
            let mut block = Block::new_leaf(n, self.block_size, self.revision);
            block.insert_item(0, &item);
            self.dirty.insert(n, Arc::new(block));
            self.root = Some(n);
            self.level = 0;
            self.item_count = 1;
            return Ok(());
        }

        let path = self.writable_path(key)?;
        let (leaf_n, _) = path[path.len() - 1];
        let (pos, added) = {
            let leaf = self.dirty_mut(leaf_n)?;
            match leaf.find_leaf(key) {
                Ok(i) => {
                    leaf.remove_item(i);
                    (i, false)
                }
                Err(i) => (i, true),
            }
        };
        if added {
            self.item_count += 1;
        }
        self.insert_at(&path, pos, item)?;
        self.maybe_flush()
    }

    /// Put `item` at slot `pos` of the block at the end of `path`,
    /// splitting blocks up the path as needed.
    fn insert_at(&mut self, path: &[PathStep], mut pos: usize, mut item: Vec<u8>) -> Result<()> {
        let mut depth = path.len() - 1;
        loop {
            let n = path[depth].0;
            {
                let block = self.dirty_mut(n)?;
                if block.fits(item.len()) {
                    block.insert_item(pos, &item);
                    return Ok(());
                }
            }
            let (divider, right_n) = self.split_block(n, pos, item)?;
            if depth == 0 {
                let level = self.level + 1;
                let root_n = self.freelist.allocate();
                let mut root = Block::new_branch(root_n, self.block_size, self.revision, level, n);
                root.insert_item(0, &encode_branch_item(right_n, &divider));
                self.dirty.insert(root_n, Arc::new(root));
                self.root = Some(root_n);
                self.level = level;
                debug!("table {}: tree grew to height {}", self.name, self.height());
                return Ok(());
            }
            depth -= 1;
            pos = (path[depth].1 + 1) as usize;
            item = encode_branch_item(right_n, &divider);
        }
    }

    /// Split block `n` while inserting `item` at `pos`. The upper part moves
    /// to a new block; returns the dividing key and the new block number.
    fn split_block(&mut self, n: BlockNumber, pos: usize, item: Vec<u8>) -> Result<(Vec<u8>, BlockNumber)> {
        let sequential = self.sequential();
        let (leaf, level, mut items) = {
            let block = self.dirty_mut(n)?;
            let mut items = block.items();
            items.insert(pos, item);
            (block.is_leaf(), block.level(), items)
        };
        let usable = self.usable(leaf);
        let right_n = self.freelist.allocate();

        let (divider, mut right) = if leaf {
            let split = choose_split(&items, pos, sequential, usable, 1);
            let right_items = items.split_off(split);
            let divider = divide(leaf_item_key(&items[items.len() - 1]), leaf_item_key(&right_items[0]));
            let mut right = Block::new_leaf(right_n, self.block_size, self.revision);
            right.fill(&right_items);
            (divider, right)
        } else {
            let split = choose_split(&items, pos, sequential, usable, 0);
            let mut right_items = items.split_off(split);
            let promoted = right_items.remove(0);
            let child = u32::from_le_bytes([promoted[0], promoted[1], promoted[2], promoted[3]]);
            let mut right = Block::new_branch(right_n, self.block_size, self.revision, level, child);
            right.fill(&right_items);
            (promoted[4..].to_vec(), right)
        };
        right.set_revision(self.revision);
        self.dirty_mut(n)?.fill(&items);
        self.dirty.insert(right_n, Arc::new(right));
        debug!(
            "table {}: split {} block {} into {} ({})",
            self.name,
            if leaf { "leaf" } else { "branch" },
            n,
            right_n,
            if sequential { "sequential" } else { "balanced" }
        );
        Ok((divider, right_n))
    }

    /// Remove `key`; returns whether it was present.
    pub fn del(&mut self, key: &[u8]) -> Result<bool> {
        self.check_writable()?;
        Self::check_key(key)?;
        if !self.key_exists(key)? {
            return Ok(false);
        }
        self.note_key(key);
        self.modified = true;
        let path = self.writable_path(key)?;
        let depth = path.len() - 1;
        let (leaf_n, _) = path[depth];
        let now_empty = {
            let leaf = self.dirty_mut(leaf_n)?;
            if let Ok(i) = leaf.find_leaf(key) {
                leaf.remove_item(i);
            }
            leaf.count() == 0
        };
        self.item_count -= 1;
        if now_empty {
            self.remove_empty(&path, depth)?;
        } else {
            self.merge_with_sibling(&path)?;
        }
        self.collapse_root()?;
        self.maybe_flush()?;
        Ok(true)
    }

    /// Unlink the empty block at `path[depth]`, and any ancestors it leaves
    /// empty.
    fn remove_empty(&mut self, path: &[PathStep], mut depth: usize) -> Result<()> {
        loop {
            let n = path[depth].0;
            let revision = self.revision;
            self.release_block(n, revision);
            if depth == 0 {
                self.root = None;
                self.level = 0;
                debug!("table {}: now empty", self.name);
                return Ok(());
            }
            depth -= 1;
            let (pn, c) = path[depth];
            let parent = self.dirty_mut(pn)?;
            if c < 0 {
                if parent.count() == 0 {
                    continue;
                }
                let first = parent.child(0);
                parent.set_left_child(first);
                parent.remove_item(0);
            } else {
                parent.remove_item(c as usize);
            }
            return Ok(());
        }
    }

    /// Fold a sparse leaf's right-hand sibling into it.
    fn merge_with_sibling(&mut self, path: &[PathStep]) -> Result<()> {
        if path.len() < 2 {
            return Ok(());
        }
        let (leaf_n, _) = path[path.len() - 1];
        let (parent_n, c) = path[path.len() - 2];
        let usable = self.usable(true);
        let sib_c = c + 1;
        let sib_n = {
            let parent = self.dirty_mut(parent_n)?;
            if sib_c >= parent.count() as isize {
                return Ok(());
            }
            parent.child(sib_c)
        };
        let leaf_used = self.dirty.get(&leaf_n).map(|b| b.used_space()).unwrap_or(usable);
        if leaf_used >= usable / 4 {
            return Ok(());
        }
        let sibling = self.read_block(sib_n)?;
        if leaf_used + sibling.used_space() > usable * 3 / 4 {
            return Ok(());
        }
        let mut items = self.dirty_mut(leaf_n)?.items();
        items.extend(sibling.items());
        self.dirty_mut(leaf_n)?.fill(&items);
        self.dirty_mut(parent_n)?.remove_item(sib_c as usize);
        self.release_block(sib_n, sibling.revision());
        trace!("table {}: merged block {} into {}", self.name, sib_n, leaf_n);
        Ok(())
    }

    /// Drop root levels which only have a single child.
    fn collapse_root(&mut self) -> Result<()> {
        while let Some(root) = self.root {
            let block = self.read_block(root)?;
            if block.is_leaf() || block.count() > 0 {
                break;
            }
            let child = block.left_child();
            self.release_block(root, block.revision());
            self.root = Some(child);
            self.level -= 1;
            debug!("table {}: tree shrank to height {}", self.name, self.height());
        }
        Ok(())
    }

    fn write_block(&self, block: &Block) -> Result<()> {
        write_all_at(&self.file, &block.data, block.n as u64 * self.block_size as u64)
    }

    fn flush_dirty(&mut self) -> Result<()> {
        let mut blocks: Vec<(BlockNumber, Arc<Block>)> = self.dirty.drain().collect();
        blocks.sort_unstable_by_key(|(n, _)| *n);
        for (n, block) in blocks {
            self.write_block(&block)?;
            self.cache.lock().put(n, block);
        }
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.dirty.len() > self.config.dirty_block_limit {
            trace!("table {}: flushing {} dirty blocks early", self.name, self.dirty.len());
            self.flush_dirty()?;
        }
        Ok(())
    }

    /// Write out the revision being built and make it the committed one.
    pub fn commit(&mut self, revision: Revision) -> Result<Option<BlockNumber>> {
        self.check_writable()?;
        if revision != self.revision {
            return Err(Error::invalid_argument(format!(
                "table {}: asked to commit revision {} but building {}",
                self.name, revision, self.revision
            )));
        }
        self.flush_dirty()?;
        if let Some(slab) = &self.slab {
            slab.sync_data()?;
        }
        self.file.sync_data()?;
        self.freelist.commit();

        let base = TableBase {
            revision,
            block_size: self.block_size as u32,
            root: self.root,
            level: self.level,
            item_count: self.item_count,
            first_unused: self.freelist.first_unused(),
            free: self.freelist.free_blocks().collect(),
            slab_len: self.slab_len,
            compress: self.compressor.is_some(),
            committed_at: Utc::now(),
        };
        base.save(&self.path)?;
        self.base = base;
        self.revision = revision + 1;
        self.modified = false;
        info!(
            "table {}: committed revision {} ({} items, height {})",
            self.name, revision, self.item_count, self.height()
        );
        Ok(self.root)
    }

    /// Throw away everything since the last commit.
    pub fn cancel(&mut self) {
        self.dirty.clear();
        self.cache.lock().clear();
        self.root = self.base.root;
        self.level = self.base.level;
        self.item_count = self.base.item_count;
        self.freelist = FreeList::new(self.base.first_unused, self.base.free.iter().copied());
        self.slab_len = self.base.slab_len;
        self.last_key.clear();
        self.forward_run = 0;
        self.modified = false;
    }

    /// Bring a read-only handle up to the newest committed revision.
    pub fn reopen(&mut self) -> Result<()> {
        if self.writable {
            return Ok(());
        }
        let base = TableBase::load(&self.path, None)?;
        if base.revision == self.base.revision {
            return Ok(());
        }
        if self.slab.is_none() && self.path.with_extension("slab").exists() {
            self.slab = Some(File::open(self.path.with_extension("slab"))?);
        }
        self.cache.lock().clear();
        self.root = base.root;
        self.level = base.level;
        self.item_count = base.item_count;
        self.revision = base.revision;
        self.freelist = FreeList::new(base.first_unused, base.free.iter().copied());
        self.slab_len = base.slab_len;
        self.base = base;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn write_raw_block(&self, block: &Block) -> Result<()> {
        self.write_block(block)
    }
}

/// Where to cut `items` (with the new item at `pos`) when splitting.
///
/// Sequential workloads cut at the insertion point so the old block stays
/// full; otherwise cut near the byte midpoint. `min_left` is the least
/// number of items the left block must keep.
fn choose_split(items: &[Vec<u8>], pos: usize, sequential: bool, usable: usize, min_left: usize) -> usize {
    let cost = |range: &[Vec<u8>]| range.iter().map(|i| i.len() + 2).sum::<usize>();
    let len = items.len();
    if sequential && pos >= min_left.max(1) && pos < len {
        if cost(&items[..pos]) <= usable && cost(&items[pos..]) <= usable {
            return pos;
        }
    }
    let total = cost(items);
    let mut best = min_left.max(1).min(len - 1);
    let mut best_diff = usize::MAX;
    let mut left = 0usize;
    for split in 1..len {
        left += items[split - 1].len() + 2;
        if split < min_left.max(1) {
            continue;
        }
        let diff = left.abs_diff(total - left);
        if diff < best_diff {
            best_diff = diff;
            best = split;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> Config {
        Config {
            block_size: 2048,
            compress_tags: false,
            ..Config::default()
        }
    }

    #[test]
    fn add_get_del_in_one_revision() {
        let dir = TempDir::new().unwrap();
        let mut table = Table::create(dir.path(), "t", &small_config()).unwrap();
        table.add(b"alpha", b"1").unwrap();
        table.add(b"beta", b"2").unwrap();
        table.add(b"alpha", b"one").unwrap();
        assert_eq!(table.get(b"alpha").unwrap(), Some(b"one".to_vec()));
        assert_eq!(table.item_count(), 2);
        assert!(table.del(b"beta").unwrap());
        assert!(!table.del(b"beta").unwrap());
        assert_eq!(table.get(b"beta").unwrap(), None);
    }

    #[test]
    fn key_limits() {
        let dir = TempDir::new().unwrap();
        let mut table = Table::create(dir.path(), "t", &small_config()).unwrap();
        assert!(table.add(&[b'k'; 252], b"ok").is_ok());
        let err = table.add(&[b'k'; 253], b"no").unwrap_err();
        assert!(err.is(ErrorKind::InvalidArgument));
        assert!(table.add(b"", b"no").unwrap_err().is(ErrorKind::InvalidArgument));
    }

    #[test]
    fn big_tags_live_in_the_slab() {
        let dir = TempDir::new().unwrap();
        let mut table = Table::create(dir.path(), "t", &small_config()).unwrap();
        let big: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        table.add(b"big", &big).unwrap();
        table.commit(1).unwrap();
        let reader = Table::open(dir.path(), "t", &small_config(), None, false).unwrap();
        assert_eq!(reader.get(b"big").unwrap(), Some(big));
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = small_config();
        let mut table = Table::create(dir.path(), "t", &config).unwrap();
        for i in 0..500u32 {
            table.add(format!("key{:05}", i).as_bytes(), &[b'x'; 40]).unwrap();
        }
        table.commit(1).unwrap();

        let reader = Table::open(dir.path(), "t", &config, None, false).unwrap();
        table.add(b"key00007", b"changed").unwrap();
        table.del(b"key00300").unwrap();
        table.commit(2).unwrap();

        assert_eq!(reader.get(b"key00007").unwrap(), Some(vec![b'x'; 40]));
        assert!(reader.key_exists(b"key00300").unwrap());
        let fresh = Table::open(dir.path(), "t", &config, None, false).unwrap();
        assert_eq!(fresh.get(b"key00007").unwrap(), Some(b"changed".to_vec()));
        assert!(!fresh.key_exists(b"key00300").unwrap());
    }

    #[test]
    fn cancel_restores_last_commit() {
        let dir = TempDir::new().unwrap();
        let mut table = Table::create(dir.path(), "t", &small_config()).unwrap();
        table.add(b"keep", b"1").unwrap();
        table.commit(1).unwrap();
        table.add(b"drop", b"2").unwrap();
        table.del(b"keep").unwrap();
        table.cancel();
        assert_eq!(table.get(b"keep").unwrap(), Some(b"1".to_vec()));
        assert_eq!(table.get(b"drop").unwrap(), None);
        assert_eq!(table.item_count(), 1);
    }

    #[test]
    fn commit_must_name_the_revision_being_built() {
        let dir = TempDir::new().unwrap();
        let mut table = Table::create(dir.path(), "t", &small_config()).unwrap();
        assert!(table.commit(5).is_err());
        assert!(table.commit(1).is_ok());
        assert_eq!(table.revision(), 1);
    }

    #[test]
    fn split_point_prefers_insertion_point_when_sequential() {
        let items: Vec<Vec<u8>> = (0..10).map(|_| vec![0u8; 100]).collect();
        assert_eq!(choose_split(&items, 9, true, 2040, 1), 9);
        assert_eq!(choose_split(&items, 9, false, 2040, 1), 5);
    }
}
