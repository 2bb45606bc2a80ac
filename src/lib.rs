//! A probabilistic full-text search engine over copy-on-write B-tree
//! tables.
//!
//! Documents go in through a [`WritableDatabase`]; searches run through
//! an [`Enquire`] on a [`Database`] snapshot, which compiles a [`Query`]
//! into a tree of postlists and ranks the matches with a weighting
//! scheme such as [`Bm25Weight`].

pub mod analysis;
pub mod backend;
pub mod compression;
pub mod core;
pub mod index;
pub mod postlist;
pub mod query;
pub mod search;
pub mod storage;
pub mod weight;

pub use crate::core::config::Config;
pub use crate::core::database::{Database, WritableDatabase};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::registry::Registry;
pub use crate::core::types::{DocCount, DocId, Document, TermCount, TermPos, ValueSlot};
pub use crate::query::{Op, Query};
pub use crate::search::{DocidOrder, Enquire, MSet, MSetItem, RSet, SortBy};
pub use crate::weight::{Bm25PlusWeight, Bm25Weight, BoolWeight, Pl2Weight, TfIdfWeight, TradWeight, Weight};
