use crate::backend::ValueCursor;
use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount, ValueSlot};
use crate::postlist::{Advance, PostList};

/// Documents whose value in a slot falls in a range, bounds inclusive.
/// A missing bound is open. Matches weigh nothing.
pub struct ValueRangePostList {
    cursor: Box<dyn ValueCursor>,
    slot: ValueSlot,
    lo: Option<Vec<u8>>,
    hi: Option<Vec<u8>>,
    /// Documents with any value in the slot.
    freq: DocCount,
    /// Set when every value in the slot is known to fall in range.
    covers_slot: bool,
}

impl ValueRangePostList {
    pub fn new(
        cursor: Box<dyn ValueCursor>,
        slot: ValueSlot,
        lo: Option<Vec<u8>>,
        hi: Option<Vec<u8>>,
        freq: DocCount,
        covers_slot: bool,
    ) -> Self {
        ValueRangePostList { cursor, slot, lo, hi, freq, covers_slot }
    }

    fn in_range(&self, value: &[u8]) -> bool {
        self.lo.as_deref().is_none_or(|lo| value >= lo) && self.hi.as_deref().is_none_or(|hi| value <= hi)
    }

    fn find_match(&mut self) -> Result<Advance> {
        while !self.cursor.at_end() {
            if self.in_range(self.cursor.value()) {
                return Ok(Advance::Unchanged);
            }
            self.cursor.next()?;
        }
        Ok(Advance::Exhausted)
    }
}

impl PostList for ValueRangePostList {
    fn termfreq_min(&self) -> DocCount {
        if self.covers_slot { self.freq } else { 0 }
    }

    fn termfreq_max(&self) -> DocCount {
        self.freq
    }

    fn termfreq_est(&self) -> DocCount {
        if self.covers_slot { self.freq } else { self.freq / 2 }
    }

    fn maxweight(&self) -> f64 {
        0.0
    }

    fn recalc_maxweight(&mut self) -> f64 {
        0.0
    }

    fn docid(&self) -> DocId {
        self.cursor.docid()
    }

    fn weight(&mut self) -> Result<f64> {
        Ok(0.0)
    }

    fn wdf(&self) -> TermCount {
        0
    }

    fn at_end(&self) -> bool {
        self.cursor.at_end()
    }

    fn next(&mut self, _w_min: f64) -> Result<Advance> {
        self.cursor.next()?;
        self.find_match()
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Advance> {
        if did <= self.cursor.docid() {
            return Ok(Advance::Unchanged);
        }
        self.cursor.skip_to(did)?;
        self.find_match()
    }

    fn description(&self) -> String {
        format!("ValueRange({}, {:?}, {:?})", self.slot, self.lo, self.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::inmemory::InMemoryDatabase;
    use crate::backend::DatabaseInternal;
    use crate::core::types::Document;
    use crate::postlist::testing::drain;

    #[test]
    fn filters_on_the_value() {
        let mut db = InMemoryDatabase::new();
        for v in ["b", "d", "", "a", "c"] {
            let mut doc = Document::new();
            doc.add_term("t", 1).unwrap();
            doc.add_value(0, v);
            db.add_document(&doc).unwrap();
        }
        let cursor = db.open_value_stream(0).unwrap();
        let pl = ValueRangePostList::new(cursor, 0, Some(b"b".to_vec()), Some(b"c".to_vec()), 4, false);
        assert_eq!(drain(Box::new(pl)), vec![1, 5]);

        let cursor = db.open_value_stream(0).unwrap();
        let pl = ValueRangePostList::new(cursor, 0, None, Some(b"b".to_vec()), 4, false);
        assert_eq!(drain(Box::new(pl)), vec![1, 4]);
    }
}
