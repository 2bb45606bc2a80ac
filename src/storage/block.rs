//! Fixed-size B-tree blocks.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! 0..4   revision the block was written in
//! 4..6   item count, top bit set for branch blocks
//! 6      level (0 for leaves)
//! 7      reserved
//! 8..    u16 item offsets, in key order
//! ...    free space
//! ...    items, item 0 nearest the end of the block
//! -4..   (branch only) left-most child pointer
//! ```
//!
//! Leaf items are `prefix [len] key tag` where the prefix byte carries the
//! compressed and slab flags and either the key length or a marker saying
//! a full length byte follows. Branch items are `child:u32 key`; keys
//! greater than or equal to an item's key live under that item's child,
//! anything smaller under the previous item (or the left-most child).

use std::cmp::Ordering;

use crate::core::error::{Error, Result};
use crate::core::types::{BlockNumber, Revision};

pub const HEADER_SIZE: usize = 8;
pub const MAX_KEY_LEN: usize = 252;
pub const BRANCH_FLAG: u16 = 0x8000;

const COMPRESSED_BIT: u8 = 0x80;
const SLAB_BIT: u8 = 0x40;
const LONG_KEY_BIT: u8 = 0x20;
const SHORT_KEY_MASK: u8 = 0x1f;

/// A decoded view of a leaf item.
#[derive(Debug, Clone, Copy)]
pub struct LeafItem<'a> {
    pub key: &'a [u8],
    pub tag: &'a [u8],
    pub compressed: bool,
    pub slab: bool,
}

pub fn encode_leaf_item(key: &[u8], tag: &[u8], compressed: bool, slab: bool) -> Vec<u8> {
    let mut item = Vec::with_capacity(key.len() + tag.len() + 2);
    let mut prefix = 0u8;
    if compressed {
        prefix |= COMPRESSED_BIT;
    }
    if slab {
        prefix |= SLAB_BIT;
    }
    if key.len() <= SHORT_KEY_MASK as usize {
        item.push(prefix | key.len() as u8);
    } else {
        item.push(prefix | LONG_KEY_BIT);
        item.push(key.len() as u8);
    }
    item.extend_from_slice(key);
    item.extend_from_slice(tag);
    item
}

pub fn encode_branch_item(child: BlockNumber, key: &[u8]) -> Vec<u8> {
    let mut item = Vec::with_capacity(key.len() + 4);
    item.extend_from_slice(&child.to_le_bytes());
    item.extend_from_slice(key);
    item
}

/// Shortest prefix of `k2` that still sorts after `k1`.
///
/// Requires `k1 < k2`.
pub fn divide(k1: &[u8], k2: &[u8]) -> Vec<u8> {
    let i = k1.iter()
        .zip(k2.iter())
        .position(|(a, b)| a != b)
        .unwrap_or(k1.len().min(k2.len()));
    k2[..(i + 1).min(k2.len())].to_vec()
}

/// Key of a raw leaf item.
pub fn leaf_item_key(item: &[u8]) -> &[u8] {
    match leaf_key_bounds(item) {
        Some((start, end)) => &item[start..end],
        None => &[],
    }
}

fn leaf_key_bounds(item: &[u8]) -> Option<(usize, usize)> {
    let prefix = *item.first()?;
    let (hdr, klen) = if prefix & LONG_KEY_BIT != 0 {
        (2, *item.get(1)? as usize)
    } else {
        (1, (prefix & SHORT_KEY_MASK) as usize)
    };
    if klen == 0 || hdr + klen > item.len() {
        return None;
    }
    Some((hdr, hdr + klen))
}

#[derive(Debug, Clone)]
pub struct Block {
    pub n: BlockNumber,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new_leaf(n: BlockNumber, block_size: usize, revision: Revision) -> Self {
        let mut block = Block { n, data: vec![0u8; block_size] };
        block.set_revision(revision);
        block
    }

    pub fn new_branch(
        n: BlockNumber,
        block_size: usize,
        revision: Revision,
        level: u8,
        left: BlockNumber,
    ) -> Self {
        let mut block = Block { n, data: vec![0u8; block_size] };
        block.set_revision(revision);
        block.data[6] = level;
        block.set_raw_count(0, true);
        block.set_left_child(left);
        block
    }

    /// Wrap bytes read from disk, checking the structure is sane.
    pub fn from_bytes(n: BlockNumber, data: Vec<u8>) -> Result<Self> {
        let block = Block { n, data };
        block.validate()?;
        Ok(block)
    }

    fn validate(&self) -> Result<()> {
        let len = self.data.len();
        let count = self.count();
        if HEADER_SIZE + 2 * count > len {
            return Err(Error::corrupt(format!("block {}: item count {} too large", self.n, count)));
        }
        if self.is_leaf() != (self.level() == 0) {
            return Err(Error::corrupt(format!(
                "block {}: branch flag disagrees with level {}", self.n, self.level()
            )));
        }
        let dir_end = HEADER_SIZE + 2 * count;
        let mut end = self.items_end();
        for i in 0..count {
            let p = self.ptr(i);
            if p < dir_end || p >= end {
                return Err(Error::corrupt(format!("block {}: bad offset for item {}", self.n, i)));
            }
            let item = &self.data[p..end];
            let ok = if self.is_leaf() {
                leaf_key_bounds(item).is_some()
            } else {
                item.len() > 4
            };
            if !ok {
                return Err(Error::corrupt(format!("block {}: malformed item {}", self.n, i)));
            }
            end = p;
        }
        Ok(())
    }

    pub fn revision(&self) -> Revision {
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    pub fn set_revision(&mut self, revision: Revision) {
        self.data[0..4].copy_from_slice(&revision.to_le_bytes());
    }

    fn raw_count(&self) -> u16 {
        u16::from_le_bytes([self.data[4], self.data[5]])
    }

    fn set_raw_count(&mut self, count: usize, branch: bool) {
        let mut raw = count as u16;
        if branch {
            raw |= BRANCH_FLAG;
        }
        self.data[4..6].copy_from_slice(&raw.to_le_bytes());
    }

    pub fn count(&self) -> usize {
        (self.raw_count() & !BRANCH_FLAG) as usize
    }

    pub fn is_leaf(&self) -> bool {
        self.raw_count() & BRANCH_FLAG == 0
    }

    pub fn level(&self) -> u8 {
        self.data[6]
    }

    pub fn block_size(&self) -> usize {
        self.data.len()
    }

    fn ptr(&self, i: usize) -> usize {
        let at = HEADER_SIZE + 2 * i;
        u16::from_le_bytes([self.data[at], self.data[at + 1]]) as usize
    }

    fn set_ptr(&mut self, i: usize, p: usize) {
        let at = HEADER_SIZE + 2 * i;
        self.data[at..at + 2].copy_from_slice(&(p as u16).to_le_bytes());
    }

    fn items_end(&self) -> usize {
        if self.is_leaf() {
            self.data.len()
        } else {
            self.data.len() - 4
        }
    }

    fn endptr(&self, i: usize) -> usize {
        if i == 0 { self.items_end() } else { self.ptr(i - 1) }
    }

    fn lowest_item(&self) -> usize {
        match self.count() {
            0 => self.items_end(),
            c => self.ptr(c - 1),
        }
    }

    pub fn item(&self, i: usize) -> &[u8] {
        &self.data[self.ptr(i)..self.endptr(i)]
    }

    pub fn items(&self) -> Vec<Vec<u8>> {
        (0..self.count()).map(|i| self.item(i).to_vec()).collect()
    }

    /// Bytes still available for items plus their offsets.
    pub fn free_space(&self) -> usize {
        self.lowest_item() - (HEADER_SIZE + 2 * self.count())
    }

    /// Space used by items and their offsets.
    pub fn used_space(&self) -> usize {
        (self.items_end() - self.lowest_item()) + 2 * self.count()
    }

    pub fn fits(&self, item_len: usize) -> bool {
        self.free_space() >= item_len + 2
    }

    pub fn leaf_item(&self, i: usize) -> LeafItem<'_> {
        let item = self.item(i);
        // Checked in validate() or when the item was inserted.
        let (start, end) = leaf_key_bounds(item).unwrap_or((1, 1));
        LeafItem {
            key: &item[start..end],
            tag: &item[end..],
            compressed: item[0] & COMPRESSED_BIT != 0,
            slab: item[0] & SLAB_BIT != 0,
        }
    }

    pub fn leaf_key(&self, i: usize) -> &[u8] {
        self.leaf_item(i).key
    }

    pub fn branch_key(&self, i: usize) -> &[u8] {
        &self.item(i)[4..]
    }

    pub fn key(&self, i: usize) -> &[u8] {
        if self.is_leaf() { self.leaf_key(i) } else { self.branch_key(i) }
    }

    pub fn left_child(&self) -> BlockNumber {
        let at = self.data.len() - 4;
        u32::from_le_bytes([self.data[at], self.data[at + 1], self.data[at + 2], self.data[at + 3]])
    }

    pub fn set_left_child(&mut self, n: BlockNumber) {
        let at = self.data.len() - 4;
        self.data[at..].copy_from_slice(&n.to_le_bytes());
    }

    /// Child for branch slot `c`; -1 is the left-most child.
    pub fn child(&self, c: isize) -> BlockNumber {
        if c < 0 {
            return self.left_child();
        }
        let item = self.item(c as usize);
        u32::from_le_bytes([item[0], item[1], item[2], item[3]])
    }

    pub fn set_child(&mut self, c: isize, n: BlockNumber) {
        if c < 0 {
            self.set_left_child(n);
            return;
        }
        let p = self.ptr(c as usize);
        self.data[p..p + 4].copy_from_slice(&n.to_le_bytes());
    }

    /// Position of `key` in a leaf: `Ok(i)` on an exact match, otherwise
    /// `Err(i)` where it would be inserted.
    pub fn find_leaf(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        let (mut lo, mut hi) = (0, self.count());
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.leaf_key(mid).cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Branch slot whose subtree may contain `key`.
    pub fn find_child(&self, key: &[u8]) -> isize {
        let (mut lo, mut hi) = (0, self.count());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.branch_key(mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo as isize - 1
    }

    /// Insert `item` as item `i`. The caller has checked it fits.
    pub fn insert_item(&mut self, i: usize, item: &[u8]) {
        let count = self.count();
        debug_assert!(i <= count && self.fits(item.len()));
        let len = item.len();
        let lo = self.lowest_item();
        let hi = self.endptr(i);
        self.data.copy_within(lo..hi, lo - len);
        for j in (i..count).rev() {
            let p = self.ptr(j) - len;
            self.set_ptr(j + 1, p);
        }
        self.set_ptr(i, hi - len);
        self.data[hi - len..hi].copy_from_slice(item);
        let branch = !self.is_leaf();
        self.set_raw_count(count + 1, branch);
    }

    pub fn remove_item(&mut self, i: usize) {
        let count = self.count();
        let start = self.ptr(i);
        let len = self.endptr(i) - start;
        let lo = self.lowest_item();
        self.data.copy_within(lo..start, lo + len);
        for j in i + 1..count {
            let p = self.ptr(j) + len;
            self.set_ptr(j - 1, p);
        }
        let branch = !self.is_leaf();
        self.set_raw_count(count - 1, branch);
        // Keep freed bytes deterministic.
        let new_lo = self.lowest_item();
        let dir_end = HEADER_SIZE + 2 * (count - 1);
        self.data[dir_end..new_lo].fill(0);
    }

    /// Drop every item, keeping the header.
    pub fn clear_items(&mut self) {
        let branch = !self.is_leaf();
        let end = self.items_end();
        self.data[HEADER_SIZE..end].fill(0);
        self.set_raw_count(0, branch);
    }

    /// Rebuild the block from a list of raw items.
    pub fn fill(&mut self, items: &[Vec<u8>]) {
        self.clear_items();
        for (i, item) in items.iter().enumerate() {
            self.insert_item(i, item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(keys: &[&str]) -> Block {
        let mut block = Block::new_leaf(1, 2048, 7);
        for key in keys {
            let item = encode_leaf_item(key.as_bytes(), b"tag", false, false);
            let pos = block.find_leaf(key.as_bytes()).unwrap_err();
            block.insert_item(pos, &item);
        }
        block
    }

    #[test]
    fn items_stay_sorted_whatever_the_insert_order() {
        let block = leaf_with(&["m", "c", "x", "a", "q"]);
        let keys: Vec<&[u8]> = (0..block.count()).map(|i| block.leaf_key(i)).collect();
        assert_eq!(keys, vec![&b"a"[..], b"c", b"m", b"q", b"x"]);
        assert_eq!(block.find_leaf(b"q"), Ok(3));
        assert_eq!(block.find_leaf(b"b"), Err(1));
        assert_eq!(block.revision(), 7);
        assert!(block.is_leaf());
    }

    #[test]
    fn removal_reclaims_space() {
        let mut block = leaf_with(&["a", "b", "c"]);
        let before = block.free_space();
        block.remove_item(1);
        assert_eq!(block.count(), 2);
        assert_eq!(block.leaf_key(1), b"c");
        assert_eq!(block.free_space(), before + 1 + 1 + 3 + 2);
        Block::from_bytes(1, block.data.clone()).unwrap();
    }

    #[test]
    fn long_keys_use_a_length_byte() {
        let key = vec![b'k'; 200];
        let item = encode_leaf_item(&key, b"v", true, false);
        let mut block = Block::new_leaf(3, 2048, 1);
        block.insert_item(0, &item);
        let li = block.leaf_item(0);
        assert_eq!(li.key, &key[..]);
        assert_eq!(li.tag, b"v");
        assert!(li.compressed && !li.slab);
    }

    #[test]
    fn branch_children_follow_dividing_keys() {
        let mut block = Block::new_branch(9, 2048, 1, 1, 100);
        block.insert_item(0, &encode_branch_item(101, b"g"));
        block.insert_item(1, &encode_branch_item(102, b"p"));
        assert!(!block.is_leaf());
        assert_eq!(block.child(block.find_child(b"a")), 100);
        assert_eq!(block.child(block.find_child(b"g")), 101);
        assert_eq!(block.child(block.find_child(b"h")), 101);
        assert_eq!(block.child(block.find_child(b"zz")), 102);
        Block::from_bytes(9, block.data.clone()).unwrap();
    }

    #[test]
    fn divide_finds_shortest_separator() {
        assert_eq!(divide(b"apple", b"apricot"), b"apr".to_vec());
        assert_eq!(divide(b"ab", b"abc"), b"abc".to_vec());
        assert_eq!(divide(b"00000017", b"00000018"), b"00000018".to_vec());
    }

    #[test]
    fn garbage_is_rejected() {
        let mut data = vec![0u8; 2048];
        data[4] = 0xff;
        data[5] = 0x7f;
        assert!(Block::from_bytes(0, data).is_err());
    }
}
