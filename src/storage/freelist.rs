use std::collections::BTreeSet;

use crate::core::types::BlockNumber;

/// Block allocator for one table.
///
/// Blocks released while a revision is being built may still be part of
/// the last committed tree, so they only become allocatable once that
/// revision has been committed. Blocks that were allocated and released
/// within the same revision were never visible to readers and go straight
/// back into the pool.
#[derive(Debug, Clone, Default)]
pub struct FreeList {
    free: BTreeSet<BlockNumber>,
    pending: Vec<BlockNumber>,
    first_unused: BlockNumber,
}

impl FreeList {
    pub fn new(first_unused: BlockNumber, free: impl IntoIterator<Item = BlockNumber>) -> Self {
        FreeList {
            free: free.into_iter().collect(),
            pending: Vec::new(),
            first_unused,
        }
    }

    /// Lowest free block, or a new one off the end of the file.
    pub fn allocate(&mut self) -> BlockNumber {
        if let Some(n) = self.free.pop_first() {
            return n;
        }
        let n = self.first_unused;
        self.first_unused += 1;
        n
    }

    /// Release a block that belongs to the last committed revision.
    pub fn release_after_commit(&mut self, n: BlockNumber) {
        self.pending.push(n);
    }

    /// Release a block created in the revision being built.
    pub fn release_now(&mut self, n: BlockNumber) {
        self.free.insert(n);
    }

    /// Called once the current revision has been made durable.
    pub fn commit(&mut self) {
        self.free.extend(self.pending.drain(..));
    }

    pub fn first_unused(&self) -> BlockNumber {
        self.first_unused
    }

    pub fn free_blocks(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.free.iter().copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
