use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{Advance, PostList};

/// Matches nothing.
#[derive(Debug, Default)]
pub struct EmptyPostList {
    started: bool,
}

impl EmptyPostList {
    pub fn new() -> Self {
        EmptyPostList::default()
    }
}

impl PostList for EmptyPostList {
    fn termfreq_min(&self) -> DocCount {
        0
    }

    fn termfreq_max(&self) -> DocCount {
        0
    }

    fn termfreq_est(&self) -> DocCount {
        0
    }

    fn maxweight(&self) -> f64 {
        0.0
    }

    fn recalc_maxweight(&mut self) -> f64 {
        0.0
    }

    fn docid(&self) -> DocId {
        0
    }

    fn weight(&mut self) -> Result<f64> {
        Ok(0.0)
    }

    fn wdf(&self) -> TermCount {
        0
    }

    fn at_end(&self) -> bool {
        self.started
    }

    fn next(&mut self, _w_min: f64) -> Result<Advance> {
        self.started = true;
        Ok(Advance::Exhausted)
    }

    fn skip_to(&mut self, _did: DocId, _w_min: f64) -> Result<Advance> {
        self.started = true;
        Ok(Advance::Exhausted)
    }

    fn description(&self) -> String {
        "Empty".to_string()
    }
}
