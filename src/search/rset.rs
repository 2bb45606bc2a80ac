use std::collections::BTreeSet;

use crate::backend::DatabaseInternal;
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, DocId};

/// Documents the user marked as relevant, for relevance feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RSet {
    docs: BTreeSet<DocId>,
}

impl RSet {
    pub fn new() -> Self {
        RSet::default()
    }

    pub fn add_document(&mut self, did: DocId) -> Result<()> {
        if did == 0 {
            return Err(Error::invalid_argument("docid 0 can't be in a relevance set"));
        }
        self.docs.insert(did);
        Ok(())
    }

    pub fn remove_document(&mut self, did: DocId) {
        self.docs.remove(&did);
    }

    pub fn contains(&self, did: DocId) -> bool {
        self.docs.contains(&did)
    }

    pub fn len(&self) -> DocCount {
        self.docs.len() as DocCount
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// How many relevant documents index `term`.
    pub fn reltermfreq(&self, db: &dyn DatabaseInternal, term: &str) -> Result<DocCount> {
        if self.docs.is_empty() {
            return Ok(0);
        }
        let mut cursor = db.open_post_list(term)?;
        let mut count = 0;
        for &did in &self.docs {
            cursor.skip_to(did)?;
            if cursor.at_end() {
                break;
            }
            if cursor.docid() == did {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl FromIterator<DocId> for RSet {
    fn from_iter<I: IntoIterator<Item = DocId>>(iter: I) -> Self {
        RSet { docs: iter.into_iter().filter(|&d| d != 0).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::db;

    #[test]
    fn counts_relevant_postings() {
        let db = db(&[&["a", "b"], &["b"], &["a"], &["c"]]);
        let rset: RSet = [1, 2, 4].into_iter().collect();
        assert_eq!(rset.reltermfreq(db.as_ref(), "a").unwrap(), 1);
        assert_eq!(rset.reltermfreq(db.as_ref(), "b").unwrap(), 2);
        assert_eq!(rset.reltermfreq(db.as_ref(), "zzz").unwrap(), 0);
        assert!(RSet::new().add_document(0).is_err());
    }
}
