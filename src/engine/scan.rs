//! Recursive archive scan engine
//!
//! Walks one archive and every nested archive under hard budgets: depth,
//! child count, single-file size, scan-wide unpacked bytes, expansion ratio,
//! and wall-clock time. Traversal names, symlinks, and encrypted entries are
//! guarded. Severity only escalates; an archive that trips a bomb guard is
//! quarantined as a whole.
//!
//! Nothing in here propagates errors through the loop: every guard either
//! skips the entry or ends the archive with a recorded outcome.

use crate::analysis::{entropy_8bit, read_head, sha256_file, FastSignature, HEAD_BYTES};
use crate::engine::{
    open_reader, route_to_handler, Action, DetectHints, FileMeta, ScanContext, Severity,
};
use crate::policy::{self, safe_quarantine};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Scan one archive and, recursively, all nested archives.
///
/// Returns the action to take on the *parent* archive and the maximum
/// severity observed in its subtree. `parent_name` is the archive-qualified
/// name of the parent (`""` for a top-level file); children are logged as
/// `parent>child`.
///
/// Depth budgeting lives in this function's pre-flight: recursion sites call
/// straight back in with `depth + 1` and the over-budget invocation
/// fail-fasts here without touching any entry.
pub fn scan_archive(
    abs_path: &Path,
    parent_name: &str,
    ctx: &mut ScanContext,
) -> (Action, Severity) {
    let mut severity = Severity::Low;
    let start = Instant::now();

    // ─── Pre-flight ────────────────────────────────────────────────
    if !abs_path.exists() {
        error!(
            scan_id = %ctx.root_scan_id,
            at = "scan_archive",
            path = %abs_path.display(),
            "file_not_found"
        );
        return (Action::Error, severity);
    }

    let packed_size = fs::metadata(abs_path).map(|m| m.len()).unwrap_or(0);

    if packed_size > ctx.limits.max_archive_size {
        warn!(
            scan_id = %ctx.root_scan_id,
            kind = "archive_too_large",
            size = packed_size,
            "violation"
        );
        return (Action::Quarantine, Severity::High);
    }
    if ctx.depth > ctx.limits.max_depth {
        warn!(
            scan_id = %ctx.root_scan_id,
            kind = "depth_exceeded",
            depth = ctx.depth,
            "violation"
        );
        return (Action::Quarantine, Severity::High);
    }

    let routed = route_to_handler(abs_path);
    if routed.handler != "zip" {
        // Not an archive we parse; the caller keeps whatever it knew.
        return (Action::Simulate, Severity::Low);
    }

    let mut reader = match open_reader(&routed.handler, abs_path) {
        Ok(r) => r,
        Err(e) => {
            error!(
                scan_id = %ctx.root_scan_id,
                at = "zip_open",
                path = %abs_path.display(),
                msg = %e,
                "open failed"
            );
            return (Action::Quarantine, Severity::Medium);
        }
    };

    // ─── Per-entry loop ────────────────────────────────────────────
    let mut local_unpacked: u64 = 0;
    let mut children: u32 = 0;
    let mut bomb_flagged = false;

    loop {
        if children >= ctx.limits.max_children_per_node {
            warn!(
                scan_id = %ctx.root_scan_id,
                kind = "max_children_exceeded",
                children,
                "violation"
            );
            bomb_flagged = true;
            break;
        }
        if exceeds_deadline(&start, ctx.limits.timeout_archive_ms) {
            bomb_flagged = true;
            break;
        }

        let entry = match reader.next_entry() {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(e) => {
                error!(scan_id = %ctx.root_scan_id, at = "next_entry", msg = %e, "read failed");
                break;
            }
        };
        children += 1;

        // Encrypted payloads cannot be introspected; presence under an
        // automated watcher is itself the signal. Flag and stop the archive.
        if entry.is_encrypted {
            warn!(scan_id = %ctx.root_scan_id, entry = %entry.name, "encrypted_entry");
            severity = severity.max(Severity::High);
            bomb_flagged = true;
            reader.skip(&entry);
            break;
        }

        let dst_base = ctx.dst_base();
        if let Err(e) = fs::create_dir_all(&dst_base) {
            error!(scan_id = %ctx.root_scan_id, at = "dst_base", msg = %e, "mkdir failed");
        }
        let out_file = dst_base.join(&entry.name);

        if entry.is_symlink && !ctx.limits.allow_symlink {
            info!(scan_id = %ctx.root_scan_id, entry = %entry.name, reason = "symlink", "skip");
            reader.skip(&entry);
            continue;
        }

        if entry.is_dir {
            let _ = reader.extract(&entry, &out_file);
            continue;
        }

        if entry.size > ctx.limits.max_single_file {
            warn!(
                scan_id = %ctx.root_scan_id,
                kind = "single_file_too_large",
                entry = %entry.name,
                size = entry.size,
                "violation"
            );
            severity = severity.max(Severity::High);
            bomb_flagged = true;
            reader.skip(&entry);
            continue;
        }

        // Checked before the extract is charged; a failing charge leaves the
        // counter untouched.
        if !ctx.try_charge_unpacked(entry.size) {
            warn!(
                scan_id = %ctx.root_scan_id,
                kind = "unpacked_budget_exceeded",
                "violation"
            );
            severity = severity.max(Severity::High);
            bomb_flagged = true;
            break;
        }

        if ctx.limits.prevent_path_traversal && escapes_base(&entry.name, &dst_base, &out_file, ctx)
        {
            warn!(
                scan_id = %ctx.root_scan_id,
                kind = "path_traversal",
                entry = %entry.name,
                "violation"
            );
            severity = severity.max(Severity::High);
            bomb_flagged = true;
            reader.skip(&entry);
            continue;
        }

        if let Err(e) = reader.extract(&entry, &out_file) {
            error!(
                scan_id = %ctx.root_scan_id,
                at = "extract",
                entry = %entry.name,
                msg = %e,
                "extract failed"
            );
            severity = severity.max(Severity::Medium);
            continue;
        }

        local_unpacked += entry.size;

        // ─── Child analysis ────────────────────────────────────────
        let name_in_archive = if parent_name.is_empty() {
            entry.name.clone()
        } else {
            format!("{parent_name}>{}", entry.name)
        };
        let meta = FileMeta {
            abs_path: out_file.clone(),
            name_in_archive,
            size_on_disk: fs::metadata(&out_file).map(|m| m.len()).unwrap_or(entry.size),
            sha256: sha256_file(&out_file).unwrap_or_default(),
        };

        let child_routed = route_to_handler(&out_file);
        let head = read_head(&out_file, HEAD_BYTES);
        let entropy = entropy_8bit(&head);
        let hints = DetectHints {
            is_archive: child_routed.is_archive(),
            high_entropy: entropy >= 7.2,
            ..Default::default()
        };

        let sig = FastSignature::scan(&out_file, &head, entropy, meta.size_on_disk);
        let mut child_sev = sig.severity;

        if child_routed.handler == "zip" {
            ctx.depth += 1;
            let (_nested_action, nested_sev) = scan_archive(&out_file, &meta.name_in_archive, ctx);
            ctx.depth -= 1;
            child_sev = child_sev.max(nested_sev);
        }

        let ext = ext_lower_no_dot(&out_file);
        let chosen = policy::choose_action(child_sev, &ctx.policy, &ext, &hints);
        let applied = policy::apply_action(chosen, &out_file, &ctx.quarantine_dir);
        info!(
            scan_id = %ctx.root_scan_id,
            entry = %meta.name_in_archive,
            sha256 = %meta.sha256,
            size = meta.size_on_disk,
            severity = %child_sev,
            action = %applied.action,
            "child"
        );
        severity = severity.max(child_sev);

        if exceeds_deadline(&start, ctx.limits.timeout_archive_ms) {
            warn!(
                scan_id = %ctx.root_scan_id,
                scope = "archive",
                ms = ctx.limits.timeout_archive_ms,
                "timeout"
            );
            severity = severity.max(Severity::High);
            bomb_flagged = true;
            break;
        }
    }

    drop(reader);

    // ─── Expansion-ratio check ─────────────────────────────────────
    if is_zip_bomb_ratio(
        local_unpacked,
        packed_size,
        ctx.limits.max_expansion_ratio,
        ctx.limits.flag_zero_packed,
    ) {
        warn!(
            scan_id = %ctx.root_scan_id,
            kind = "expansion_ratio",
            packed = packed_size,
            unpacked = local_unpacked,
            "violation"
        );
        severity = severity.max(Severity::High);
        bomb_flagged = true;
    }

    // ─── Termination ───────────────────────────────────────────────
    if bomb_flagged {
        match safe_quarantine(abs_path, &ctx.quarantine_dir) {
            Ok(dst) => {
                info!(
                    scan_id = %ctx.root_scan_id,
                    path = %abs_path.display(),
                    to = %dst.display(),
                    "quarantine_parent"
                );
                (Action::Quarantine, severity)
            }
            Err(e) => {
                error!(
                    scan_id = %ctx.root_scan_id,
                    at = "quarantine_parent",
                    msg = %e,
                    "quarantine failed"
                );
                (Action::Error, severity)
            }
        }
    } else {
        (Action::Simulate, severity)
    }
}

// ─── Guards ────────────────────────────────────────────────────────

fn exceeds_deadline(start: &Instant, ms: u32) -> bool {
    start.elapsed().as_millis() > u128::from(ms)
}

/// Expansion-ratio zip-bomb check. A zero packed size is lenient by default;
/// `flag_zero_packed` switches to the strict reading.
fn is_zip_bomb_ratio(unpacked: u64, packed: u64, max_ratio: f64, flag_zero_packed: bool) -> bool {
    if packed == 0 {
        return flag_zero_packed && unpacked > 0;
    }
    (unpacked as f64) / (packed as f64) > max_ratio
}

/// True when the entry must not be written at `out_file`: absolute names
/// (unless allowed) and destinations escaping `dst_base`.
fn escapes_base(entry_name: &str, dst_base: &Path, out_file: &Path, ctx: &ScanContext) -> bool {
    if !ctx.limits.allow_absolute_paths && Path::new(entry_name).is_absolute() {
        return true;
    }
    is_path_traversal(dst_base, out_file)
}

/// Zip-slip guard: resolve both paths without requiring the target to exist,
/// then require the target to stay under the base. Falls back to a lexical
/// prefix comparison when canonicalization fails.
fn is_path_traversal(base: &Path, target: &Path) -> bool {
    match (weak_canonical(base), weak_canonical(target)) {
        (Ok(b), Ok(t)) => !t.starts_with(&b),
        _ => {
            let b = lexical_normal(base);
            let t = lexical_normal(target);
            !t.starts_with(&b)
        }
    }
}

/// Canonicalize the longest existing prefix of `path`, then re-append the
/// remaining components lexically. Mirrors `weakly_canonical` semantics.
fn weak_canonical(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }
    let mut canon = if existing.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        existing.canonicalize()?
    };
    for name in tail.iter().rev() {
        canon.push(name);
    }
    Ok(lexical_normal(&canon))
}

/// Resolve `.` and `..` components lexically, without touching the
/// filesystem. `..` at the root stays at the root.
fn lexical_normal(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn ext_lower_no_dot(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}
