use crate::backend::{DatabaseInternal, TermCursor};
use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, TermCount};
use crate::postlist::{Advance, PostList};

/// Every document in the database, weighing nothing. Walks the document
/// length stream, so it costs no more than a single term.
pub struct AllDocsPostList {
    cursor: Box<dyn TermCursor>,
}

impl AllDocsPostList {
    pub fn open(db: &dyn DatabaseInternal) -> Result<Self> {
        Ok(AllDocsPostList { cursor: db.open_post_list("")? })
    }

    /// Length of the current document.
    pub fn doclength(&self) -> TermCount {
        self.cursor.wdf()
    }

    fn state(&self) -> Advance {
        if self.cursor.at_end() { Advance::Exhausted } else { Advance::Unchanged }
    }
}

impl PostList for AllDocsPostList {
    fn termfreq_min(&self) -> DocCount {
        self.cursor.termfreq()
    }

    fn termfreq_max(&self) -> DocCount {
        self.cursor.termfreq()
    }

    fn termfreq_est(&self) -> DocCount {
        self.cursor.termfreq()
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
        1
    }

    fn at_end(&self) -> bool {
        self.cursor.at_end()
    }

    fn next(&mut self, _w_min: f64) -> Result<Advance> {
        self.cursor.next()?;
        Ok(self.state())
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Advance> {
        if did > self.cursor.docid() {
            self.cursor.skip_to(did)?;
        }
        Ok(self.state())
    }

    fn description(&self) -> String {
        "AllDocs".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::{db, drain};

    #[test]
    fn lists_every_document() {
        let db = db(&[&["a"], &["b", "c"], &["d"]]);
        let pl = AllDocsPostList::open(db.as_ref()).unwrap();
        assert_eq!(pl.termfreq_est(), 3);
        assert_eq!(drain(Box::new(pl)), vec![1, 2, 3]);
    }
}
