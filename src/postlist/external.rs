use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{Advance, PostList};
use crate::query::source::PostingSource;

/// Adapts an initialised posting source, scaling its weights by `factor`.
pub struct ExternalPostList {
    source: Box<dyn PostingSource>,
    factor: f64,
}

impl ExternalPostList {
    pub fn new(source: Box<dyn PostingSource>, factor: f64) -> Self {
        ExternalPostList { source, factor }
    }

    fn state(&self) -> Advance {
        if self.source.at_end() { Advance::Exhausted } else { Advance::Unchanged }
    }

    /// The source's own threshold, undoing our scaling.
    fn source_min(&self, w_min: f64) -> f64 {
        if self.factor > 0.0 { w_min / self.factor } else { 0.0 }
    }
}

impl PostList for ExternalPostList {
    fn termfreq_min(&self) -> DocCount {
        self.source.termfreq_min()
    }

    fn termfreq_max(&self) -> DocCount {
        self.source.termfreq_max()
    }

    fn termfreq_est(&self) -> DocCount {
        self.source.termfreq_est()
    }

    fn maxweight(&self) -> f64 {
        self.source.maxweight() * self.factor
    }

    fn recalc_maxweight(&mut self) -> f64 {
        self.maxweight()
    }

    fn docid(&self) -> DocId {
        self.source.docid()
    }

    fn weight(&mut self) -> Result<f64> {
        Ok(self.source.weight() * self.factor)
    }

    fn wdf(&self) -> TermCount {
        1
    }

    fn at_end(&self) -> bool {
        self.source.at_end()
    }

    fn next(&mut self, w_min: f64) -> Result<Advance> {
        let min = self.source_min(w_min);
        self.source.next(min)?;
        Ok(self.state())
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Advance> {
        if did > self.source.docid() {
            let min = self.source_min(w_min);
            self.source.skip_to(did, min)?;
        }
        Ok(self.state())
    }

    fn description(&self) -> String {
        format!("External({})", self.source.description())
    }
}
