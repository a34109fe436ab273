//! Fast-signature triage — deterministic additive scoring
//!
//! Scores a file from cheap observations only: magic bytes, extension class,
//! Shannon entropy, and ASCII keyword hits in the head window. The score maps
//! to a severity band; the reason string records exactly which features fired,
//! in a fixed order, so identical inputs always produce identical output.

use crate::engine::Severity;
use std::path::Path;

/// Head window handed to the scanner (and to entropy) per file.
pub const HEAD_BYTES: usize = 128 * 1024;

const EXEC_EXTS: &[&str] = &[".exe", ".dll", ".scr", ".sys", ".msi", ".lnk", ".jar"];
const SCRIPT_EXTS: &[&str] = &[".js", ".vbs", ".bat", ".ps1", ".hta", ".cmd", ".wsf"];
const ARCHIVE_EXTS: &[&str] = &[".zip", ".rar", ".7z", ".cab", ".iso", ".img"];
const MACRO_OFFICE_EXTS: &[&str] = &[".docm", ".xlsm", ".pptm"];

/// Keyword table, in scoring order. Matched against the lowercased ASCII
/// projection of the head window.
const KEYWORDS: &[(&str, f64, &str)] = &[
    ("powershell", 0.25, "kw:powershell"),
    ("cmd.exe", 0.20, "kw:cmd"),
    ("wscript", 0.20, "kw:wscript"),
    ("http://", 0.15, "kw:http"),
    ("https://", 0.15, "kw:https"),
    ("document_open", 0.25, "kw:vba_auto"),
    ("autoopen", 0.25, "kw:vba_auto2"),
    ("base64", 0.15, "kw:base64"),
];

/// Outcome of a fast-signature scan.
#[derive(Debug, Clone)]
pub struct FastSignature {
    /// Additive score clamped to `[0, 1]`.
    pub score: f64,
    /// Severity band derived from the score.
    pub severity: Severity,
    /// Semicolon-joined tags for every feature that fired, in table order.
    pub reason: String,
}

impl FastSignature {
    /// Score a file from its path, head bytes, entropy, and size.
    pub fn scan(path: &Path, head: &[u8], entropy: f64, size: u64) -> Self {
        fn add(score: &mut f64, reason: &mut String, w: f64, tag: &str) {
            *score += w;
            reason.push_str(tag);
            reason.push(';');
        }

        let mut score = 0.0;
        let mut reason = String::new();

        if head.len() >= 2 && head[0] == b'M' && head[1] == b'Z' {
            add(&mut score, &mut reason, 0.50, "MZ");
        }

        let ext = extension_lower(path);
        if EXEC_EXTS.contains(&ext.as_str()) {
            add(&mut score, &mut reason, 0.40, "ext:exec");
        }
        if SCRIPT_EXTS.contains(&ext.as_str()) {
            add(&mut score, &mut reason, 0.30, "ext:script");
        }
        if ARCHIVE_EXTS.contains(&ext.as_str()) {
            add(&mut score, &mut reason, 0.20, "ext:archive");
        }
        if MACRO_OFFICE_EXTS.contains(&ext.as_str()) {
            add(&mut score, &mut reason, 0.30, "ext:office-macro");
        }

        if entropy >= 7.2 {
            add(&mut score, &mut reason, 0.30, "entropy>7.2");
        }
        if entropy >= 7.8 {
            add(&mut score, &mut reason, 0.10, "entropy>7.8");
        }

        let projected = ascii_lower_projection(head);
        for (needle, weight, tag) in KEYWORDS {
            if projected.contains(needle) {
                add(&mut score, &mut reason, *weight, tag);
            }
        }

        if size > 50 * 1024 * 1024 {
            add(&mut score, &mut reason, 0.05, "size>50MB");
        }

        let score = score.min(1.0);
        FastSignature {
            score,
            severity: Severity::from_score(score),
            reason,
        }
    }
}

/// Lowercase extension with its leading dot, empty when the path has none.
pub fn extension_lower(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(e) => format!(".{}", e.to_lowercase()),
        None => String::new(),
    }
}

/// Project the head window onto printable ASCII: bytes outside `0x20..=0x7E`
/// become spaces, the rest are lowercased. Keyword search runs on this
/// projection so UTF-16 and binary-embedded strings still match.
fn ascii_lower_projection(head: &[u8]) -> String {
    head.iter()
        .map(|&b| {
            if (0x20..=0x7E).contains(&b) {
                (b as char).to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect()
}
