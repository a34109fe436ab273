//! File analysis primitives — entropy, hashing, fast-signature scoring

pub mod entropy;
pub mod hashing;
pub mod signature;

pub use entropy::entropy_8bit;
pub use hashing::{sha256_file, sha256_hex};
pub use signature::{extension_lower, FastSignature, HEAD_BYTES};

use std::io::Read;
use std::path::Path;

/// Read up to `n` head bytes of a file. Unreadable files yield an empty
/// buffer; triage treats that the same as an empty file.
pub fn read_head(path: &Path, n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    if let Ok(f) = std::fs::File::open(path) {
        let _ = f.take(n as u64).read_to_end(&mut out);
    }
    out
}
