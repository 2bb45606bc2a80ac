use std::ops::Deref;
use std::sync::Arc;

use crate::core::error::Result;
use crate::storage::block::Block;
use crate::storage::table::Table;

/// Ordered cursor over a table.
///
/// The cursor keeps the root-to-leaf path as a stack of (block, slot)
/// pairs. For branch levels the slot is the child being visited (-1 for
/// the left-most child); for the leaf it is the current item.
///
/// A fresh cursor sits before the first entry; `next()` moves to it.
pub struct TableCursor<T: Deref<Target = Table>> {
    table: T,
    path: Vec<(Arc<Block>, isize)>,
    at_end: bool,
}

impl<T: Deref<Target = Table>> TableCursor<T> {
    pub fn new(table: T) -> Self {
        TableCursor { table, path: Vec::new(), at_end: false }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Go back to before the first entry.
    pub fn rewind(&mut self) {
        self.path.clear();
        self.at_end = false;
    }

    pub fn after_end(&self) -> bool {
        self.at_end
    }

    fn leaf(&self) -> Option<(&Arc<Block>, isize)> {
        self.path.last().map(|(b, i)| (b, *i))
    }

    /// Key of the current entry, if positioned on one.
    pub fn key(&self) -> Option<&[u8]> {
        if self.at_end {
            return None;
        }
        let (block, i) = self.leaf()?;
        if i < 0 || i as usize >= block.count() {
            return None;
        }
        Some(block.leaf_key(i as usize))
    }

    /// Tag of the current entry.
    pub fn tag(&self) -> Result<Option<Vec<u8>>> {
        if self.key().is_none() {
            return Ok(None);
        }
        let Some((block, i)) = self.leaf() else {
            return Ok(None);
        };
        Ok(Some(self.table.read_tag(&block.leaf_item(i as usize))?))
    }

    /// Walk down from `block` always taking the first (or last) child.
    fn descend_edge(&mut self, mut block: Arc<Block>, rightmost: bool) -> Result<()> {
        loop {
            if block.is_leaf() {
                let i = if rightmost { block.count() as isize - 1 } else { 0 };
                self.path.push((block, i));
                return Ok(());
            }
            let c = if rightmost { block.count() as isize - 1 } else { -1 };
            let child = self.table.read_block(block.child(c))?;
            self.path.push((block, c));
            block = child;
        }
    }

    /// Position on the first entry with key >= `key`. Returns true on an
    /// exact match. Leaves the cursor after the end if there is none.
    pub fn seek_ge(&mut self, key: &[u8]) -> Result<bool> {
        self.path.clear();
        self.at_end = false;
        let Some(root) = self.table.root() else {
            self.at_end = true;
            return Ok(false);
        };
        let mut block = self.table.read_block(root)?;
        while !block.is_leaf() {
            let c = block.find_child(key);
            let child = self.table.read_block(block.child(c))?;
            self.path.push((block, c));
            block = child;
        }
        let (i, exact) = match block.find_leaf(key) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        };
        let count = block.count();
        self.path.push((block, i as isize));
        if i >= count {
            self.step_forward()?;
        }
        Ok(exact)
    }

    /// Position on the last entry with key <= `key`. Returns true on an
    /// exact match; if every key is larger the cursor ends up before the
    /// first entry.
    pub fn find_entry(&mut self, key: &[u8]) -> Result<bool> {
        if self.seek_ge(key)? {
            return Ok(true);
        }
        self.prev()?;
        Ok(false)
    }

    /// Move to the next leaf entry after the current slot.
    fn step_forward(&mut self) -> Result<bool> {
        if let Some((block, i)) = self.path.last_mut() {
            if ((*i + 1) as usize) < block.count() {
                *i += 1;
                return Ok(true);
            }
        }
        // Climb until a branch has a further child, then go down its left edge.
        self.path.pop();
        while let Some((block, c)) = self.path.last_mut() {
            if *c + 1 < block.count() as isize {
                *c += 1;
                let child = self.table.read_block(block.child(*c))?;
                self.descend_edge(child, false)?;
                return Ok(true);
            }
            self.path.pop();
        }
        self.at_end = true;
        Ok(false)
    }

    pub fn next(&mut self) -> Result<bool> {
        if self.at_end {
            return Ok(false);
        }
        if self.path.is_empty() {
            let Some(root) = self.table.root() else {
                self.at_end = true;
                return Ok(false);
            };
            let block = self.table.read_block(root)?;
            self.descend_edge(block, false)?;
            return Ok(self.key().is_some() || self.step_forward()?);
        }
        self.step_forward()
    }

    /// Move back one entry. Returns false (leaving the cursor before the
    /// first entry) if there is no previous entry.
    pub fn prev(&mut self) -> Result<bool> {
        if self.at_end {
            // Re-enter from the right-hand edge.
            self.at_end = false;
            self.path.clear();
            let Some(root) = self.table.root() else {
                return Ok(false);
            };
            let block = self.table.read_block(root)?;
            self.descend_edge(block, true)?;
            return Ok(self.key().is_some());
        }
        if let Some((_, i)) = self.path.last_mut() {
            if *i > 0 {
                *i -= 1;
                return Ok(true);
            }
        } else {
            return Ok(false);
        }
        self.path.pop();
        while let Some((block, c)) = self.path.last_mut() {
            if *c >= 0 {
                *c -= 1;
                let child = self.table.read_block(block.child(*c))?;
                self.descend_edge(child, true)?;
                return Ok(true);
            }
            self.path.pop();
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::Config;
    use crate::storage::table::Table;
    use tempfile::TempDir;

    fn filled(n: u32) -> (TempDir, Table) {
        let dir = TempDir::new().unwrap();
        let config = Config { block_size: 2048, compress_tags: false, ..Config::default() };
        let mut table = Table::create(dir.path(), "c", &config).unwrap();
        for i in 0..n {
            table.add(format!("k{:05}", i * 2).as_bytes(), &[b'v'; 60]).unwrap();
        }
        table.commit(1).unwrap();
        (dir, table)
    }

    #[test]
    fn walk_forward_and_back_across_blocks() {
        let (_dir, table) = filled(300);
        assert!(table.height() >= 2);
        let mut cursor = table.cursor();
        let mut seen = 0;
        let mut last: Vec<u8> = Vec::new();
        while cursor.next().unwrap() {
            let key = cursor.key().unwrap().to_vec();
            assert!(key > last);
            last = key;
            seen += 1;
        }
        assert_eq!(seen, 300);
        assert!(cursor.after_end());

        let mut back = 0;
        while cursor.prev().unwrap() {
            back += 1;
        }
        assert_eq!(back, 300);
    }

    #[test]
    fn seek_lands_on_next_key_and_find_entry_on_previous() {
        let (_dir, table) = filled(300);
        let mut cursor = table.cursor();
        assert!(!cursor.seek_ge(b"k00101").unwrap());
        assert_eq!(cursor.key().unwrap(), b"k00102");
        assert!(!cursor.find_entry(b"k00101").unwrap());
        assert_eq!(cursor.key().unwrap(), b"k00100");
        assert!(cursor.seek_ge(b"k00598").unwrap());
        assert!(!cursor.next().unwrap());
        assert!(!cursor.seek_ge(b"z").unwrap());
        assert!(cursor.after_end());
        assert!(!cursor.find_entry(b"a").unwrap());
        assert_eq!(cursor.key(), None);
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.key().unwrap(), b"k00000");
        assert_eq!(cursor.tag().unwrap().unwrap(), vec![b'v'; 60]);
    }
}
