//! Posting sources: postlists supplied from outside the index, such as
//! weights read from document values.

use std::fmt::Debug;
use std::sync::Arc;

use crate::backend::{DatabaseInternal, TermCursor, ValueCursor};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocCount, DocId, ValueSlot};
use crate::core::utils::sortable_unserialise;
use crate::weight::{get_params, put_params};

pub trait PostingSource: Debug + Send {
    /// Name the source is registered under.
    fn name(&self) -> &'static str;

    fn clone_box(&self) -> Box<dyn PostingSource>;

    fn serialise(&self) -> Vec<u8>;

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn PostingSource>>;

    /// Attach to `db`, positioned before the first document.
    fn init(&mut self, db: &Arc<dyn DatabaseInternal>) -> Result<()>;

    fn termfreq_min(&self) -> DocCount;
    fn termfreq_est(&self) -> DocCount;
    fn termfreq_max(&self) -> DocCount;

    /// Never less than any weight returned later.
    fn maxweight(&self) -> f64;
    fn weight(&self) -> f64;

    fn docid(&self) -> DocId;
    fn at_end(&self) -> bool;
    fn next(&mut self, w_min: f64) -> Result<()>;
    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<()>;

    fn description(&self) -> String {
        self.name().to_string()
    }
}

impl Clone for Box<dyn PostingSource> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn not_initialised(name: &str) -> Error {
    Error::new(ErrorKind::InvalidOperation, format!("{} used before init", name))
}

/// Every document, all with the same weight.
pub struct FixedWeightPostingSource {
    weight: f64,
    cursor: Option<Box<dyn TermCursor>>,
}

impl Clone for FixedWeightPostingSource {
    fn clone(&self) -> Self {
        FixedWeightPostingSource::new(self.weight)
    }
}

impl Debug for FixedWeightPostingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWeightPostingSource").field("weight", &self.weight).finish()
    }
}

impl FixedWeightPostingSource {
    pub fn new(weight: f64) -> Self {
        FixedWeightPostingSource { weight: weight.max(0.0), cursor: None }
    }

    fn freq(&self) -> DocCount {
        self.cursor.as_ref().map_or(0, |c| c.termfreq())
    }
}

impl PostingSource for FixedWeightPostingSource {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn clone_box(&self) -> Box<dyn PostingSource> {
        Box::new(self.clone())
    }

    fn serialise(&self) -> Vec<u8> {
        put_params(&[self.weight])
    }

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn PostingSource>> {
        let [weight] = get_params::<1>("fixed", data)?;
        Ok(Box::new(FixedWeightPostingSource::new(weight)))
    }

    fn init(&mut self, db: &Arc<dyn DatabaseInternal>) -> Result<()> {
        self.cursor = Some(db.open_post_list("")?);
        Ok(())
    }

    fn termfreq_min(&self) -> DocCount {
        self.freq()
    }

    fn termfreq_est(&self) -> DocCount {
        self.freq()
    }

    fn termfreq_max(&self) -> DocCount {
        self.freq()
    }

    fn maxweight(&self) -> f64 {
        self.weight
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn docid(&self) -> DocId {
        self.cursor.as_ref().map_or(0, |c| c.docid())
    }

    fn at_end(&self) -> bool {
        self.cursor.as_ref().is_none_or(|c| c.at_end())
    }

    fn next(&mut self, _w_min: f64) -> Result<()> {
        self.cursor.as_mut().ok_or_else(|| not_initialised("fixed"))?.next()
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<()> {
        self.cursor.as_mut().ok_or_else(|| not_initialised("fixed"))?.skip_to(did)
    }

    fn description(&self) -> String {
        format!("FixedWeight({})", self.weight)
    }
}

/// Documents with a value in `slot`, weighed by that value read as a
/// number written with `sortable_serialise`. Negative values weigh 0.
pub struct ValueWeightPostingSource {
    slot: ValueSlot,
    cursor: Option<Box<dyn ValueCursor>>,
    freq: DocCount,
    max: f64,
}

impl Debug for ValueWeightPostingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueWeightPostingSource").field("slot", &self.slot).field("max", &self.max).finish()
    }
}

impl ValueWeightPostingSource {
    pub fn new(slot: ValueSlot) -> Self {
        ValueWeightPostingSource { slot, cursor: None, freq: 0, max: 0.0 }
    }
}

impl PostingSource for ValueWeightPostingSource {
    fn name(&self) -> &'static str {
        "value_weight"
    }

    fn clone_box(&self) -> Box<dyn PostingSource> {
        Box::new(ValueWeightPostingSource::new(self.slot))
    }

    fn serialise(&self) -> Vec<u8> {
        self.slot.to_be_bytes().to_vec()
    }

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn PostingSource>> {
        let raw: [u8; 4] = data
            .try_into()
            .map_err(|_| Error::serialisation("value_weight source wants a 4 byte slot"))?;
        Ok(Box::new(ValueWeightPostingSource::new(ValueSlot::from_be_bytes(raw))))
    }

    fn init(&mut self, db: &Arc<dyn DatabaseInternal>) -> Result<()> {
        let stats = db.value_stats(self.slot)?;
        self.freq = stats.freq;
        self.max = if stats.freq == 0 { 0.0 } else { sortable_unserialise(&stats.upper_bound).max(0.0) };
        self.cursor = Some(db.open_value_stream(self.slot)?);
        Ok(())
    }

    fn termfreq_min(&self) -> DocCount {
        self.freq
    }

    fn termfreq_est(&self) -> DocCount {
        self.freq
    }

    fn termfreq_max(&self) -> DocCount {
        self.freq
    }

    fn maxweight(&self) -> f64 {
        self.max
    }

    fn weight(&self) -> f64 {
        self.cursor.as_ref().map_or(0.0, |c| sortable_unserialise(c.value()).clamp(0.0, self.max))
    }

    fn docid(&self) -> DocId {
        self.cursor.as_ref().map_or(0, |c| c.docid())
    }

    fn at_end(&self) -> bool {
        self.cursor.as_ref().is_none_or(|c| c.at_end())
    }

    fn next(&mut self, _w_min: f64) -> Result<()> {
        self.cursor.as_mut().ok_or_else(|| not_initialised("value_weight"))?.next()
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<()> {
        self.cursor.as_mut().ok_or_else(|| not_initialised("value_weight"))?.skip_to(did)
    }

    fn description(&self) -> String {
        format!("ValueWeight({})", self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::inmemory::InMemoryDatabase;
    use crate::core::types::Document;
    use crate::core::utils::sortable_serialise;

    fn db_with_values(values: &[Option<f64>]) -> Arc<dyn DatabaseInternal> {
        let mut db = InMemoryDatabase::new();
        for v in values {
            let mut doc = Document::new();
            doc.add_term("t", 1).unwrap();
            if let Some(v) = v {
                doc.add_value(3, sortable_serialise(*v));
            }
            db.add_document(&doc).unwrap();
        }
        Arc::new(db)
    }

    #[test]
    fn value_weights() {
        let db = db_with_values(&[Some(2.5), None, Some(-1.0), Some(7.0)]);
        let mut src = ValueWeightPostingSource::new(3);
        src.init(&db).unwrap();
        assert_eq!(src.maxweight(), 7.0);
        let mut seen = Vec::new();
        src.next(0.0).unwrap();
        while !src.at_end() {
            seen.push((src.docid(), src.weight()));
            src.next(0.0).unwrap();
        }
        assert_eq!(seen, vec![(1, 2.5), (3, 0.0), (4, 7.0)]);
    }

    #[test]
    fn fixed_weight_covers_every_document() {
        let db = db_with_values(&[None, None, None]);
        let mut src = FixedWeightPostingSource::new(1.5);
        src.init(&db).unwrap();
        assert_eq!(src.termfreq_est(), 3);
        src.skip_to(2, 0.0).unwrap();
        assert_eq!((src.docid(), src.weight()), (2, 1.5));
        let back = src.unserialise(&src.serialise()).unwrap();
        assert_eq!(back.maxweight(), 1.5);
    }
}
