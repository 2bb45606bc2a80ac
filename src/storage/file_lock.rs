use std::fs::{File, OpenOptions};

use log::debug;

use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::DatabaseLayout;

/// Single writer guarantee for a database directory.
///
/// The lock is an `flock` on a file inside the directory; it is dropped
/// together with the file handle.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn acquire(layout: &DatabaseLayout) -> Result<Self> {
        let lock_path = layout.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                Error::new(
                    ErrorKind::DatabaseLock,
                    format!("can't open lock file {}: {}", lock_path.display(), e),
                )
            })?;

        #[cfg(unix)]
        {
            use libc::{flock, LOCK_EX, LOCK_NB};
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            // SAFETY: fd is a valid open descriptor owned by `file`.
            let rc = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
            if rc != 0 {
                return Err(Error::new(
                    ErrorKind::DatabaseLock,
                    format!("database {} is locked by another writer", layout.dir.display()),
                ));
            }
        }

        debug!("locked {}", lock_path.display());
        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::{flock, LOCK_UN};
            use std::os::unix::io::AsRawFd;

            let fd = self.file.as_raw_fd();
            // SAFETY: see acquire().
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_writer_is_refused_until_the_first_goes() {
        let dir = TempDir::new().unwrap();
        let layout = DatabaseLayout::new(dir.path());
        let first = FileLock::acquire(&layout).unwrap();
        let err = FileLock::acquire(&layout).unwrap_err();
        assert!(err.is(ErrorKind::DatabaseLock));
        drop(first);
        assert!(FileLock::acquire(&layout).is_ok());
    }
}
