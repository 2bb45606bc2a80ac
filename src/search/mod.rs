//! Ranked retrieval: the matcher and the API around it.

pub mod enquire;
pub mod matcher;
pub mod mset;
pub mod rset;

pub use enquire::Enquire;
pub use matcher::{Collapse, DocidOrder, MatchOptions, Matcher, SortBy};
pub use mset::{MSet, MSetItem};
pub use rset::RSet;
