//! Structural checker for a single table.
//!
//! Problems are tallied rather than raised, so one pass reports every
//! violation it can find. Only failing to read the base file aborts.

use std::fmt::Write as _;

use roaring::RoaringBitmap;

use crate::core::error::Result;
use crate::core::types::{BlockNumber, Revision};
use crate::storage::block::Block;
use crate::storage::table::Table;

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    pub short_tree: bool,
    pub full_tree: bool,
    pub show_bitmap: bool,
    pub show_stats: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TableCheckReport {
    pub table: String,
    pub revision: Revision,
    pub height: u32,
    pub items: u64,
    pub leaf_blocks: u64,
    pub branch_blocks: u64,
    pub free_blocks: u64,
    pub errors: Vec<String>,
    /// Dumps and statistics requested through `CheckOptions`.
    pub output: Vec<String>,
}

impl TableCheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub(crate) fn printable_key(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\x{:02x}", b);
        }
    }
    out
}

struct Walker<'a> {
    table: &'a Table,
    opts: CheckOptions,
    used: RoaringBitmap,
    report: TableCheckReport,
}

impl Walker<'_> {
    fn error(&mut self, msg: String) {
        self.report.errors.push(msg);
    }

    fn visit(
        &mut self,
        n: BlockNumber,
        level: u8,
        parent_revision: Revision,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) {
        if !self.used.insert(n) {
            self.error(format!("block {} is referenced twice", n));
            return;
        }
        let block = match self.table.read_block(n) {
            Ok(block) => block,
            Err(e) => {
                self.error(format!("block {} unreadable: {}", n, e));
                return;
            }
        };
        if block.revision() > parent_revision {
            self.error(format!(
                "stale revision: block {} has revision {} but its parent has {}",
                n, block.revision(), parent_revision
            ));
        }
        if block.level() != level {
            self.error(format!("block {} is at level {} but should be at {}", n, block.level(), level));
            return;
        }
        if block.count() == 0 && block.is_leaf() {
            self.error(format!("leaf block {} is empty", n));
        }
        if self.opts.short_tree || self.opts.full_tree {
            let indent = "  ".repeat((self.table.level() - level) as usize);
            self.report.output.push(format!(
                "{}block {} level {} rev {} items {} free {}",
                indent, n, level, block.revision(), block.count(), block.free_space()
            ));
            if self.opts.full_tree {
                for i in 0..block.count() {
                    self.report.output.push(format!("{}  {}", indent, printable_key(block.key(i))));
                }
            }
        }

        self.check_keys(&block, lower, upper);

        if block.is_leaf() {
            self.report.leaf_blocks += 1;
            self.report.items += block.count() as u64;
            for i in 0..block.count() {
                if let Err(e) = self.table.read_tag(&block.leaf_item(i)) {
                    self.error(format!(
                        "block {} item {}: tag unreadable: {}", n, printable_key(block.leaf_key(i)), e
                    ));
                }
            }
            return;
        }

        self.report.branch_blocks += 1;
        let count = block.count() as isize;
        for c in -1..count {
            let lo = if c < 0 { lower } else { Some(block.branch_key(c as usize)) };
            let hi = if c + 1 < count { Some(block.branch_key((c + 1) as usize)) } else { upper };
            self.visit(block.child(c), level - 1, block.revision(), lo, hi);
        }
    }

    fn check_keys(&mut self, block: &Block, lower: Option<&[u8]>, upper: Option<&[u8]>) {
        let n = block.n;
        for i in 0..block.count() {
            let key = block.key(i);
            if i > 0 && block.key(i - 1) >= key {
                self.error(format!("sorted-key violation in block {} at item {}", n, i));
            }
            if let Some(lo) = lower {
                if key < lo {
                    self.error(format!(
                        "block {} item {}: key {} below dividing key {}",
                        n, i, printable_key(key), printable_key(lo)
                    ));
                }
            }
            if let Some(hi) = upper {
                if key >= hi {
                    self.error(format!(
                        "block {} item {}: key {} not below dividing key {}",
                        n, i, printable_key(key), printable_key(hi)
                    ));
                }
            }
        }
    }
}

fn bitmap_ranges(bitmap: &RoaringBitmap) -> String {
    let mut out = String::new();
    let mut iter = bitmap.iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if !out.is_empty() {
            out.push(',');
        }
        if start == end {
            let _ = write!(out, "{}", start);
        } else {
            let _ = write!(out, "{}-{}", start, end);
        }
    }
    out
}

/// Check one table at the revision it was opened at.
pub fn check_table(table: &Table, opts: CheckOptions) -> Result<TableCheckReport> {
    let mut walker = Walker {
        table,
        opts,
        used: RoaringBitmap::new(),
        report: TableCheckReport {
            table: table.name().to_string(),
            revision: table.revision(),
            height: table.height(),
            ..TableCheckReport::default()
        },
    };

    if let Some(root) = table.root() {
        walker.visit(root, table.level(), table.working_revision(), None, None);
    }

    if walker.report.items != table.item_count() {
        let msg = format!(
            "item count mismatch: base says {} but the tree holds {}",
            table.item_count(), walker.report.items
        );
        walker.error(msg);
    }

    let first_unused = table.first_unused_block();
    let mut free = RoaringBitmap::new();
    for n in table.free_blocks() {
        if n >= first_unused {
            walker.error(format!("free list entry {} is past the end ({})", n, first_unused));
        }
        if walker.used.contains(n) {
            walker.error(format!("bitmap double-free: block {} is in use and on the free list", n));
        }
        free.insert(n);
    }
    walker.report.free_blocks = free.len();
    let mut all = walker.used.clone();
    all |= &free;
    for n in 0..first_unused {
        if !all.contains(n) {
            walker.error(format!("block {} is neither in use nor free", n));
        }
    }

    if opts.show_bitmap {
        walker.report.output.push(format!("used blocks: {}", bitmap_ranges(&walker.used)));
        walker.report.output.push(format!("free blocks: {}", bitmap_ranges(&free)));
    }
    if opts.show_stats {
        let r = &walker.report;
        let line = format!(
            "{}: revision {} height {} items {} leaf blocks {} branch blocks {} free blocks {} committed {}",
            r.table, r.revision, r.height, r.items, r.leaf_blocks, r.branch_blocks, r.free_blocks,
            table.base().committed_at.to_rfc3339()
        );
        walker.report.output.push(line);
    }
    Ok(walker.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use tempfile::TempDir;

    fn config() -> Config {
        Config { block_size: 2048, compress_tags: false, ..Config::default() }
    }

    #[test]
    fn healthy_table_after_random_churn() {
        let dir = TempDir::new().unwrap();
        let mut table = Table::create(dir.path(), "t", &config()).unwrap();
        let mut rev = 1;
        for round in 0..3u32 {
            for i in 0..400u32 {
                let k = (i * 7919 + round * 13) % 1000;
                table.add(format!("key{:04}", k).as_bytes(), &[b'a' + (round as u8); 50]).unwrap();
            }
            for i in (0..1000u32).step_by(3 + round as usize) {
                table.del(format!("key{:04}", i).as_bytes()).unwrap();
            }
            table.commit(rev).unwrap();
            rev += 1;
        }
        let reader = Table::open(dir.path(), "t", &config(), None, false).unwrap();
        let report = check_table(&reader, CheckOptions { show_stats: true, ..Default::default() }).unwrap();
        assert!(report.is_ok(), "{:?}", report.errors);
        assert_eq!(report.items, reader.item_count());
        assert_eq!(report.output.len(), 1);
    }

    #[test]
    fn swapped_keys_are_reported() {
        let dir = TempDir::new().unwrap();
        let mut table = Table::create(dir.path(), "t", &config()).unwrap();
        table.add(b"a", b"1").unwrap();
        table.add(b"b", b"2").unwrap();
        table.commit(1).unwrap();

        let root = table.root().unwrap();
        let block = table.read_block(root).unwrap();
        let mut bad = (*block).clone();
        let items = bad.items();
        bad.fill(&[items[1].clone(), items[0].clone()]);
        table.write_raw_block(&bad).unwrap();

        let reader = Table::open(dir.path(), "t", &config(), None, false).unwrap();
        let report = check_table(&reader, CheckOptions::default()).unwrap();
        assert!(report.errors.iter().any(|e| e.contains("sorted-key violation")));
    }

    #[test]
    fn ranges_are_compact() {
        let bitmap: RoaringBitmap = [0u32, 1, 2, 5, 7, 8].into_iter().collect();
        assert_eq!(bitmap_ranges(&bitmap), "0-2,5,7-8");
    }
}
