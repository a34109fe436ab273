//! ZIP reader on the `zip` crate
//!
//! Index-based cursor over the central directory. Encryption is detected per
//! entry by probing a password-less open: the crate refuses to hand out a
//! reader for ciphertext, which is exactly the signal the scanner needs.

use crate::engine::reader::{ArchiveReader, EntryInfo};
use crate::VigilResult;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

pub struct ZipReader {
    archive: ZipArchive<File>,
    index: usize,
    total: usize,
}

impl ZipReader {
    pub fn open(path: &Path) -> VigilResult<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file)?;
        let total = archive.len();
        Ok(Self {
            archive,
            index: 0,
            total,
        })
    }

    fn extract_current(&mut self, entry: &EntryInfo, dst: &Path) -> VigilResult<()> {
        if entry.is_dir {
            fs::create_dir_all(dst)?;
            return Ok(());
        }
        // Link targets are never materialized, in any configuration.
        if entry.is_symlink {
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut zf = self.archive.by_index(self.index)?;
        let mut out = File::create(dst)?;
        io::copy(&mut zf, &mut out)?;
        Ok(())
    }
}

impl ArchiveReader for ZipReader {
    fn next_entry(&mut self) -> VigilResult<Option<EntryInfo>> {
        if self.index >= self.total {
            return Ok(None);
        }

        // Probe without a password: encrypted entries are refused here.
        let is_encrypted = match self.archive.by_index(self.index) {
            Ok(_) => false,
            Err(ZipError::UnsupportedArchive(msg)) if msg.contains("Password") => true,
            Err(ZipError::InvalidPassword) => true,
            Err(e) => return Err(e.into()),
        };

        let raw = self.archive.by_index_raw(self.index)?;
        let is_symlink = raw
            .unix_mode()
            .map_or(false, |m| m & 0o170_000 == 0o120_000);
        Ok(Some(EntryInfo {
            name: raw.name().to_string(),
            size: raw.size(),
            is_dir: raw.is_dir(),
            is_symlink,
            is_encrypted,
        }))
    }

    fn extract(&mut self, entry: &EntryInfo, dst: &Path) -> VigilResult<()> {
        let result = self.extract_current(entry, dst);
        // Advance on every terminal outcome, including failure.
        self.index += 1;
        result
    }

    fn skip(&mut self, _entry: &EntryInfo) {
        if self.index < self.total {
            self.index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let f = File::create(path).unwrap();
        let mut zw = zip::ZipWriter::new(f);
        let opts =
            FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
        for (name, payload) in entries {
            zw.start_file(*name, opts).unwrap();
            zw.write_all(payload).unwrap();
        }
        zw.finish().unwrap();
    }

    #[test]
    fn peek_is_idempotent_until_advanced() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("two.zip");
        write_zip(&zip_path, &[("a.txt", b"alpha"), ("b.txt", b"beta")]);

        let mut r = ZipReader::open(&zip_path).unwrap();
        let first = r.next_entry().unwrap().unwrap();
        let again = r.next_entry().unwrap().unwrap();
        assert_eq!(first.name, "a.txt");
        assert_eq!(again.name, "a.txt", "peek must not advance");
        assert_eq!(first.size, 5);

        r.skip(&first);
        let second = r.next_entry().unwrap().unwrap();
        assert_eq!(second.name, "b.txt");
        r.skip(&second);
        assert!(r.next_entry().unwrap().is_none());
    }

    #[test]
    fn extract_writes_payload_and_advances() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("one.zip");
        write_zip(&zip_path, &[("hello.txt", b"hello world")]);

        let mut r = ZipReader::open(&zip_path).unwrap();
        let e = r.next_entry().unwrap().unwrap();
        let dst = dir.path().join("out").join("hello.txt");
        r.extract(&e, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"hello world");
        assert!(r.next_entry().unwrap().is_none());
    }

    #[test]
    fn failed_extract_still_advances() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("two.zip");
        write_zip(&zip_path, &[("a.txt", b"alpha"), ("b.txt", b"beta")]);

        // Destination parent is a regular file, so create_dir_all fails.
        let blocker = dir.path().join("blocker");
        File::create(&blocker).unwrap().write_all(b"x").unwrap();
        let bad_dst = blocker.join("nested").join("a.txt");

        let mut r = ZipReader::open(&zip_path).unwrap();
        let e = r.next_entry().unwrap().unwrap();
        assert!(r.extract(&e, &bad_dst).is_err());

        // The cursor moved past the failed entry.
        let next = r.next_entry().unwrap().unwrap();
        assert_eq!(next.name, "b.txt");
    }

    #[test]
    fn directory_entries_are_reported_and_created() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("dirs.zip");
        let f = File::create(&zip_path).unwrap();
        let mut zw = zip::ZipWriter::new(f);
        let opts =
            FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
        zw.add_directory("sub/", opts).unwrap();
        zw.start_file("sub/inner.txt", opts).unwrap();
        zw.write_all(b"inner").unwrap();
        zw.finish().unwrap();

        let mut r = ZipReader::open(&zip_path).unwrap();
        let d = r.next_entry().unwrap().unwrap();
        assert!(d.is_dir);
        let dst = dir.path().join("out").join("sub");
        r.extract(&d, &dst).unwrap();
        assert!(dst.is_dir());
    }

    #[test]
    fn open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("garbage.zip");
        File::create(&p).unwrap().write_all(b"PK but not really").unwrap();
        assert!(ZipReader::open(&p).is_err());
    }
}
