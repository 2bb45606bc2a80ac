pub mod config;
pub mod database;
pub mod error;
pub mod registry;
pub mod stats;
pub mod types;
pub mod utils;
