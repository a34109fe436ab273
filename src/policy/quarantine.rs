//! Safe quarantine primitive for hostile archives
//!
//! Used by the scan engine on a bomb-flagged parent archive. The destination
//! carries an explicit `.quarantine` suffix so nothing in the quarantine
//! directory is double-clickable under its original extension.

use crate::VigilResult;
use std::fs;
use std::path::{Path, PathBuf};

/// Move `src` into `quarantine_dir` as `<basename>.quarantine`, suffixing
/// `.quarantine.<i>` until the name is unique. Tries a same-volume rename
/// first; on failure falls back to copy-with-overwrite then source removal.
/// Returns the final destination.
pub fn safe_quarantine(src: &Path, quarantine_dir: &Path) -> VigilResult<PathBuf> {
    fs::create_dir_all(quarantine_dir)?;

    let base = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let mut dst = quarantine_dir.join(format!("{base}.quarantine"));
    let mut i = 0u32;
    while dst.exists() {
        i += 1;
        dst = quarantine_dir.join(format!("{base}.quarantine.{i}"));
    }

    if fs::rename(src, &dst).is_err() {
        fs::copy(src, &dst)?;
        fs::remove_file(src)?;
    }
    Ok(dst)
}
