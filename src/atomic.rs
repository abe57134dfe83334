//! Whole-file replacement through a sibling temp file.
//!
//! Readers see either the old contents or the new ones, never a prefix. The
//! temp file lives in the destination directory so the final rename stays on
//! one filesystem; on any failure it is removed when dropped.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::FramelabelError;

/// Atomically replaces `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), FramelabelError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|source| FramelabelError::persistence(dir, source))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|source| FramelabelError::persistence(tmp.path(), source))?;
    tmp.persist(path)
        .map_err(|err| FramelabelError::persistence(path, err.error))?;
    Ok(())
}
