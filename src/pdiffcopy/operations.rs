//! Positional file I/O shared by the client and the server.
//!
//! Reads and writes take an explicit byte offset so distinct blocks can be
//! processed from multiple workers without sharing file descriptors or seek
//! positions. Callers guarantee that concurrent writes never overlap; with
//! that, positional I/O is safe in parallel. The file is never truncated or
//! extended here.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::pdiffcopy::errors::Result;

/// Size of a local file, or `None` when it does not exist.
pub fn file_size(path: &Path) -> Result<Option<u64>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read exactly `length` bytes starting at `offset`.
pub fn read_block(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    tracing::debug!("reading {} block at {offset} ({length} bytes)", path.display());
    let file = File::open(path)?;
    #[allow(clippy::cast_possible_truncation)]
    let mut buf = vec![0u8; length as usize];
    file.read_exact_at(&mut buf, offset)?;
    Ok(buf)
}

/// Write `data` in place starting at `offset`. The file must already exist.
pub fn write_block(path: &Path, offset: u64, data: &[u8]) -> Result<()> {
    tracing::debug!("writing {} block at {offset} ({} bytes)", path.display(), data.len());
    let file = OpenOptions::new().write(true).truncate(false).open(path)?;
    file.write_all_at(data, offset)?;
    Ok(())
}
