use std::fs::File;

use crate::core::error::{Error, ErrorKind, Result};

/// Positional read of exactly `buf.len()` bytes.
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(buf, offset).map_err(|e| short_io(e, "read", offset))
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        let mut done = 0;
        while done < buf.len() {
            let n = file.seek_read(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                return Err(Error::new(ErrorKind::Io, format!("short read at offset {}", offset)));
            }
            done += n;
        }
        Ok(())
    }
}

/// Positional write of all of `buf`.
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.write_all_at(buf, offset).map_err(|e| short_io(e, "write", offset))
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        let mut done = 0;
        while done < buf.len() {
            let n = file.seek_write(&buf[done..], offset + done as u64)?;
            if n == 0 {
                return Err(Error::new(ErrorKind::Io, format!("short write at offset {}", offset)));
            }
            done += n;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn short_io(err: std::io::Error, what: &str, offset: u64) -> Error {
    Error::new(ErrorKind::Io, format!("{} at offset {} failed: {}", what, offset, err))
}
