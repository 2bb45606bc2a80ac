use serde::{Deserialize, Serialize};

use crate::backend::DatabaseInternal;
use crate::core::types::{DocCount, DocId, TermCount};

/// Collection-wide figures for a database snapshot, for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub description: String,
    pub doccount: DocCount,
    pub last_docid: DocId,
    pub total_length: u64,
    pub avlength: f64,
    pub doclength_lower_bound: TermCount,
    pub doclength_upper_bound: TermCount,
    pub has_positions: bool,
}

impl DatabaseStats {
    pub fn collect(db: &dyn DatabaseInternal) -> Self {
        DatabaseStats {
            description: db.description(),
            doccount: db.doccount(),
            last_docid: db.last_docid(),
            total_length: db.total_length(),
            avlength: db.avlength(),
            doclength_lower_bound: db.doclength_lower_bound(),
            doclength_upper_bound: db.doclength_upper_bound(),
            has_positions: db.has_positions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postlist::testing::db;

    #[test]
    fn collects_and_serialises() {
        let db = db(&[&["a", "b", "c"], &["a"]]);
        let stats = DatabaseStats::collect(db.as_ref());
        assert_eq!(stats.doccount, 2);
        assert_eq!(stats.total_length, 4);
        assert_eq!(stats.avlength, 2.0);
        assert!(stats.has_positions);
        let json = serde_json::to_string(&stats).unwrap();
        let back: DatabaseStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
