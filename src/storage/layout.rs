use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind, Result};

/// Tables making up one database, in commit order. The postlist table is
/// committed last so its revision marks a complete commit.
pub const TABLE_NAMES: [&str; 8] = [
    "record", "termlist", "position", "value", "spelling", "synonym", "metadata", "postlist",
];

/// File naming inside a database directory.
#[derive(Debug, Clone)]
pub struct DatabaseLayout {
    pub dir: PathBuf,
}

impl DatabaseLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DatabaseLayout { dir: dir.into() }
    }

    /// Create the directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let layout = Self::new(dir);
        fs::create_dir_all(&layout.dir).map_err(|e| {
            Error::new(
                ErrorKind::DatabaseOpening,
                format!("can't create database directory {}: {}", layout.dir.display(), e),
            )
        })?;
        Ok(layout)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join("flintlock")
    }

    pub fn table_file(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.DB", table))
    }

    /// A directory holds a database once its postlist table has a base.
    pub fn is_database(&self) -> bool {
        self.dir.join("postlist.baseA").exists() || self.dir.join("postlist.baseB").exists()
    }

    pub fn check_table_name(name: &str) -> Result<()> {
        if TABLE_NAMES.contains(&name) {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "unknown table '{}', expected one of {}", name, TABLE_NAMES.join(", ")
            )))
        }
    }
}
