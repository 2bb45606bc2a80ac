use crate::core::error::{Error, Result};
use crate::core::types::TermCount;
use crate::weight::{Weight, WeightStats};

/// Gives every document a weight of 0, for pure boolean retrieval.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolWeight;

impl Weight for BoolWeight {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn clone_box(&self) -> Box<dyn Weight> {
        Box::new(*self)
    }

    fn serialise(&self) -> Vec<u8> {
        Vec::new()
    }

    fn unserialise(&self, data: &[u8]) -> Result<Box<dyn Weight>> {
        if !data.is_empty() {
            return Err(Error::serialisation("bool weight takes no parameters"));
        }
        Ok(Box::new(BoolWeight))
    }

    fn init(&mut self, _stats: &WeightStats, _factor: f64) {}

    fn sumpart(
        &self,
        _wdf: TermCount,
        _doclen: TermCount,
        _unique_terms: TermCount,
        _wdf_doc_max: TermCount,
    ) -> f64 {
        0.0
    }

    fn maxpart(&self) -> f64 {
        0.0
    }

    fn needs_wdf(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_zero() {
        let mut w = BoolWeight;
        w.init(&WeightStats::default(), 3.0);
        assert_eq!(w.sumpart(5, 10, 3, 5), 0.0);
        assert_eq!(w.maxpart(), 0.0);
        assert!(!w.needs_wdf());
        assert!(w.unserialise(b"x").is_err());
    }
}
