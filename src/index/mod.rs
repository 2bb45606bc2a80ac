pub mod inverter;
pub mod metadata;
pub mod position;
pub mod posting;
pub mod postlist_table;
pub mod record;
pub mod spelling;
pub mod synonym;
pub mod termlist;
pub mod value;
