//! Scan engine — core types and the bounded recursive archive scanner
//!
//! The engine operates on adversarial input. Every limit in [`Limits`] is a
//! hard budget enforced during traversal; severity only ever escalates.

pub mod reader;
pub mod router;
pub mod scan;
pub mod zip_reader;

pub use reader::{open_reader, ArchiveReader, EntryInfo};
pub use router::{route_to_handler, RoutingDecision};
pub use scan::scan_archive;

use crate::policy::PolicyMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// ─── Severity & Action ─────────────────────────────────────────────

/// Risk level of a file or scan subtree. Ordered; combining severities
/// always takes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Band a fast-signature score into a severity.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            Severity::Critical
        } else if score >= 0.60 {
            Severity::High
        } else if score >= 0.40 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" | "med" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(()),
        }
    }
}

/// Response applied to a file. `Simulate` is the no-op default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Simulate,
    Rename,
    Quarantine,
    Delete,
    Skip,
    Error,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Simulate => "simulate",
            Action::Rename => "rename",
            Action::Quarantine => "quarantine",
            Action::Delete => "delete",
            Action::Skip => "skip",
            Action::Error => "error",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Limits ────────────────────────────────────────────────────────

/// Hard resource budgets for one archive scan tree. Immutable per scan.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum nesting depth of archives-within-archives.
    pub max_depth: u32,
    /// Maximum entries processed per archive node.
    pub max_children_per_node: u32,
    /// Maximum on-disk size of any single archive.
    pub max_archive_size: u64,
    /// Scan-wide cap on cumulative declared uncompressed bytes.
    pub max_total_unpacked: u64,
    /// Cap on any single entry's declared uncompressed size.
    pub max_single_file: u64,
    /// Zip-bomb trigger: declared-unpacked / packed ratio ceiling.
    pub max_expansion_ratio: f64,
    /// Wall-clock budget per archive node, in milliseconds.
    pub timeout_archive_ms: u32,
    /// Reserved per-file budget; carried for configuration parity.
    pub timeout_file_ms: u32,
    pub allow_symlink: bool,
    pub prevent_path_traversal: bool,
    pub allow_absolute_paths: bool,
    /// Reserved; junction handling is a platform concern.
    pub follow_junctions: bool,
    /// Strict reading of a zero packed size: when set, an unreadable packed
    /// size counts as a zip-bomb indicator instead of being ignored.
    pub flag_zero_packed: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_children_per_node: 20_000,
            max_archive_size: 1 << 30,       // 1 GiB
            max_total_unpacked: 4 << 30,     // 4 GiB
            max_single_file: 512 << 20,      // 512 MiB
            max_expansion_ratio: 1000.0,
            timeout_archive_ms: 20_000,
            timeout_file_ms: 5_000,
            allow_symlink: false,
            prevent_path_traversal: true,
            allow_absolute_paths: false,
            follow_junctions: false,
            flag_zero_packed: false,
        }
    }
}

// ─── Scan context ──────────────────────────────────────────────────

/// Policy inputs threaded into the scan so child files extracted from
/// archives are judged by the same rules as top-level files.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext {
    pub mode: PolicyMode,
    pub min_severity: Severity,
}

impl Default for PolicyContext {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Simulate,
            min_severity: Severity::Medium,
        }
    }
}

/// Mutable state threaded through one archive scan tree.
///
/// `total_unpacked` is shared across the whole tree (not per node) and only
/// ever grows; [`ScanContext::try_charge_unpacked`] checks the budget before
/// charging so the counter can never pass `max_total_unpacked`.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub limits: Limits,
    pub policy: PolicyContext,
    pub temp_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    /// Opaque id naming the top-level scan; temp extraction lives under
    /// `temp_dir/root_scan_id/<depth>`.
    pub root_scan_id: String,
    pub depth: u32,
    pub total_unpacked: u64,
}

impl ScanContext {
    pub fn new(
        limits: Limits,
        policy: PolicyContext,
        temp_dir: PathBuf,
        quarantine_dir: PathBuf,
    ) -> Self {
        Self {
            limits,
            policy,
            temp_dir,
            quarantine_dir,
            root_scan_id: Uuid::new_v4().to_string(),
            depth: 0,
            total_unpacked: 0,
        }
    }

    /// Charge `add` declared bytes against the scan-wide unpacked budget.
    ///
    /// Returns `false` without charging when the charge would exceed
    /// `max_total_unpacked`. Overflow-safe: the comparison is done by
    /// subtraction from the cap, never by adding to the counter first.
    pub fn try_charge_unpacked(&mut self, add: u64) -> bool {
        let cap = self.limits.max_total_unpacked;
        if add > cap || self.total_unpacked > cap - add {
            return false;
        }
        self.total_unpacked += add;
        true
    }

    /// Extraction directory for the current depth.
    pub fn dst_base(&self) -> PathBuf {
        self.temp_dir
            .join(&self.root_scan_id)
            .join(self.depth.to_string())
    }
}

// ─── Per-file records ──────────────────────────────────────────────

/// Analysis record for a file extracted from an archive.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub abs_path: PathBuf,
    /// Archive-qualified name, composed as `parent>child`.
    pub name_in_archive: String,
    pub size_on_disk: u64,
    pub sha256: String,
}

/// Feature flags accumulated for a file during triage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectHints {
    pub is_archive: bool,
    pub high_entropy: bool,
    pub has_macro: bool,
    pub has_javascript: bool,
    pub suspicious_imports: bool,
    pub packed_upx: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_is_monotone() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::High.max(Severity::Medium), Severity::High);
    }

    #[test]
    fn severity_bands_from_score() {
        assert_eq!(Severity::from_score(0.80), Severity::Critical);
        assert_eq!(Severity::from_score(0.79), Severity::High);
        assert_eq!(Severity::from_score(0.60), Severity::High);
        assert_eq!(Severity::from_score(0.59), Severity::Medium);
        assert_eq!(Severity::from_score(0.40), Severity::Medium);
        assert_eq!(Severity::from_score(0.39), Severity::Low);
    }

    #[test]
    fn severity_parse_roundtrip() {
        for s in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
            assert_eq!(s.as_str().parse::<Severity>(), Ok(s));
        }
        assert!("nonsense".parse::<Severity>().is_err());
    }

    #[test]
    fn unpacked_budget_is_overflow_safe() {
        let mut ctx = ScanContext::new(
            Limits {
                max_total_unpacked: 100,
                ..Limits::default()
            },
            PolicyContext::default(),
            PathBuf::from("/tmp"),
            PathBuf::from("/tmp/q"),
        );
        assert!(ctx.try_charge_unpacked(60));
        assert!(!ctx.try_charge_unpacked(41), "would exceed the cap");
        assert_eq!(ctx.total_unpacked, 60, "failed charge must not mutate");
        assert!(ctx.try_charge_unpacked(40));
        assert!(!ctx.try_charge_unpacked(u64::MAX), "no wraparound");
        assert_eq!(ctx.total_unpacked, 100);
    }

    #[test]
    fn fresh_contexts_get_distinct_scan_ids() {
        let a = ScanContext::new(
            Limits::default(),
            PolicyContext::default(),
            PathBuf::from("/tmp"),
            PathBuf::from("/tmp/q"),
        );
        let b = ScanContext::new(
            Limits::default(),
            PolicyContext::default(),
            PathBuf::from("/tmp"),
            PathBuf::from("/tmp/q"),
        );
        assert_ne!(a.root_scan_id, b.root_scan_id);
    }
}
