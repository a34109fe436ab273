//! Archive reader abstraction
//!
//! A reader owns one open archive and exposes a peek/advance cursor:
//! `next_entry` reports the current entry without moving, `extract` and
//! `skip` consume it. Release is `Drop`.
//!
//! Cursor discipline: the cursor advances on *every* terminal outcome of an
//! entry — successful extract, failed extract, directory creation, or an
//! explicit skip. A caller that rejects an entry can therefore never spin on
//! it. `skip` advances without writing anything, which is how rejected
//! entries (symlinks, oversize payloads, traversal names) are passed over
//! without touching the filesystem.

use crate::{VigilError, VigilResult};
use std::path::Path;

/// Metadata for one archive entry, as declared by the container.
#[derive(Debug, Clone, Default)]
pub struct EntryInfo {
    /// Path within the archive, exactly as declared (may be hostile).
    pub name: String,
    /// Declared uncompressed size in bytes.
    pub size: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub is_encrypted: bool,
}

/// Capability set over one open archive.
pub trait ArchiveReader {
    /// Metadata for the current entry, `None` once exhausted. Idempotent
    /// until the cursor is advanced by `extract` or `skip`.
    fn next_entry(&mut self) -> VigilResult<Option<EntryInfo>>;

    /// Write the current entry to `dst` (directories are created, files are
    /// decompressed) and advance the cursor, also on failure.
    fn extract(&mut self, entry: &EntryInfo, dst: &Path) -> VigilResult<()>;

    /// Advance the cursor without writing anything.
    fn skip(&mut self, entry: &EntryInfo);
}

/// Open a reader for the routed handler.
pub fn open_reader(handler: &str, path: &Path) -> VigilResult<Box<dyn ArchiveReader>> {
    match handler {
        "zip" => Ok(Box::new(super::zip_reader::ZipReader::open(path)?)),
        other => Err(VigilError::UnsupportedFormat(other.to_string())),
    }
}
