//! Response policy — severity threshold plus mode dispatch
//!
//! The matrix is deliberately small: a severity below the configured minimum
//! is always simulated; at or above it, the configured mode decides between
//! rename-in-place and quarantine. Action execution degrades to `Simulate`
//! on I/O failure so the event report is never blocked by a filesystem hiccup.

pub mod quarantine;

pub use quarantine::safe_quarantine;

use crate::engine::{Action, DetectHints, PolicyContext, Severity};
use crate::{VigilError, VigilResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Configured response mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Simulate,
    Rename,
    Quarantine,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::Simulate => "simulate",
            PolicyMode::Rename => "rename",
            PolicyMode::Quarantine => "quarantine",
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulate" => Ok(PolicyMode::Simulate),
            "rename" => Ok(PolicyMode::Rename),
            "quarantine" => Ok(PolicyMode::Quarantine),
            _ => Err(()),
        }
    }
}

/// Result of executing an action: what actually happened and where the file
/// ended up, if it moved.
#[derive(Debug, Clone)]
pub struct Applied {
    pub action: Action,
    pub target: Option<PathBuf>,
}

/// Map a severity to an action under the configured threshold and mode.
///
/// `ext` and `hints` are reserved for per-extension and per-feature
/// overrides; the base matrix ignores them.
pub fn choose_action(
    severity: Severity,
    policy: &PolicyContext,
    _ext: &str,
    _hints: &DetectHints,
) -> Action {
    if severity < policy.min_severity {
        return Action::Simulate;
    }
    match policy.mode {
        PolicyMode::Simulate => Action::Simulate,
        PolicyMode::Rename => Action::Rename,
        PolicyMode::Quarantine => Action::Quarantine,
    }
}

/// Execute an action on a file. I/O failures degrade to `Simulate` with a
/// warning; the caller still reports the event.
pub fn apply_action(action: Action, path: &Path, quarantine_dir: &Path) -> Applied {
    match action {
        Action::Rename => match rename_blocked(path) {
            Ok(target) => {
                info!(from = %path.display(), to = %target.display(), "policy rename");
                Applied {
                    action: Action::Rename,
                    target: Some(target),
                }
            }
            Err(e) => {
                warn!(path = %path.display(), msg = %e, "rename failed, simulating");
                Applied {
                    action: Action::Simulate,
                    target: None,
                }
            }
        },
        Action::Quarantine => match move_quarantine(path, quarantine_dir) {
            Ok(target) => {
                info!(from = %path.display(), to = %target.display(), "policy quarantine");
                Applied {
                    action: Action::Quarantine,
                    target: Some(target),
                }
            }
            Err(e) => {
                warn!(path = %path.display(), msg = %e, "quarantine failed, simulating");
                Applied {
                    action: Action::Simulate,
                    target: None,
                }
            }
        },
        Action::Delete => match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "policy delete");
                Applied {
                    action: Action::Delete,
                    target: None,
                }
            }
            Err(e) => {
                warn!(path = %path.display(), msg = %e, "delete failed, simulating");
                Applied {
                    action: Action::Simulate,
                    target: None,
                }
            }
        },
        other => Applied {
            action: other,
            target: None,
        },
    }
}

/// Rename a file in place by appending `.blocked`, uniquifying collisions.
pub fn rename_blocked(path: &Path) -> VigilResult<PathBuf> {
    let mut blocked = path.as_os_str().to_os_string();
    blocked.push(".blocked");
    let target = unique_target(Path::new(&blocked));
    fs::rename(path, &target)?;
    Ok(target)
}

/// Move a file into the quarantine directory under its own name, uniquifying
/// collisions. Prefers a same-volume rename; falls back to copy-then-remove
/// across volumes.
pub fn move_quarantine(path: &Path, quarantine_dir: &Path) -> VigilResult<PathBuf> {
    fs::create_dir_all(quarantine_dir)?;
    let name = path
        .file_name()
        .ok_or_else(|| VigilError::Config(format!("no file name in {}", path.display())))?;
    let target = unique_target(&quarantine_dir.join(name));
    if fs::rename(path, &target).is_err() {
        fs::copy(path, &target)?;
        fs::remove_file(path)?;
    }
    Ok(target)
}

/// First non-colliding variant of `base`: the path itself, then
/// `<stem>_<i><ext>` for i in 1..9999, then a `_dup` suffix as a last resort.
pub fn unique_target(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }
    let parent = base.parent().unwrap_or_else(|| Path::new(""));
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = base.extension().and_then(|e| e.to_str());
    for i in 1..10_000 {
        let candidate = match ext {
            Some(ext) => parent.join(format!("{stem}_{i}.{ext}")),
            None => parent.join(format!("{stem}_{i}")),
        };
        if !candidate.exists() {
            return candidate;
        }
    }
    let mut fallback = base.as_os_str().to_os_string();
    fallback.push("_dup");
    PathBuf::from(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn ctx(mode: PolicyMode, min: Severity) -> PolicyContext {
        PolicyContext {
            mode,
            min_severity: min,
        }
    }

    fn touch(path: &Path, content: &[u8]) {
        File::create(path).unwrap().write_all(content).unwrap();
    }

    #[test]
    fn below_threshold_always_simulates() {
        let p = ctx(PolicyMode::Quarantine, Severity::High);
        let hints = DetectHints::default();
        assert_eq!(
            choose_action(Severity::Medium, &p, "exe", &hints),
            Action::Simulate
        );
        assert_eq!(
            choose_action(Severity::High, &p, "exe", &hints),
            Action::Quarantine
        );
        assert_eq!(
            choose_action(Severity::Critical, &p, "exe", &hints),
            Action::Quarantine
        );
    }

    #[test]
    fn simulate_mode_never_acts() {
        let p = ctx(PolicyMode::Simulate, Severity::Low);
        let hints = DetectHints::default();
        assert_eq!(
            choose_action(Severity::Critical, &p, "exe", &hints),
            Action::Simulate
        );
    }

    #[test]
    fn rename_appends_blocked_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload.exe");
        touch(&src, b"MZ");
        let target = rename_blocked(&src).unwrap();
        assert_eq!(target, dir.path().join("payload.exe.blocked"));
        assert!(!src.exists());
        assert!(target.exists());
    }

    #[test]
    fn rename_uniquifies_collisions() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("payload.exe.blocked"), b"old");
        let src = dir.path().join("payload.exe");
        touch(&src, b"MZ");
        let target = rename_blocked(&src).unwrap();
        assert_eq!(target, dir.path().join("payload.exe_1.blocked"));
    }

    #[test]
    fn quarantine_moves_under_own_name() {
        let dir = tempfile::tempdir().unwrap();
        let qdir = dir.path().join("q");
        let src = dir.path().join("dropper.bin");
        touch(&src, b"payload");
        let target = move_quarantine(&src, &qdir).unwrap();
        assert_eq!(target, qdir.join("dropper.bin"));
        assert!(!src.exists());
        assert_eq!(fs::read(&target).unwrap(), b"payload");
    }

    #[test]
    fn quarantine_collisions_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let qdir = dir.path().join("q");
        let mut seen = Vec::new();
        for i in 0..4 {
            let src = dir.path().join("same-name.bin");
            touch(&src, format!("gen {i}").as_bytes());
            let target = move_quarantine(&src, &qdir).unwrap();
            assert!(!seen.contains(&target), "collision on {}", target.display());
            seen.push(target);
        }
        // Every generation is still readable; nothing was overwritten.
        assert_eq!(fs::read(&seen[0]).unwrap(), b"gen 0");
        assert_eq!(fs::read(&seen[3]).unwrap(), b"gen 3");
    }

    #[test]
    fn failed_action_degrades_to_simulate() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("already-gone.exe");
        let applied = apply_action(Action::Rename, &missing, dir.path());
        assert_eq!(applied.action, Action::Simulate);
        assert!(applied.target.is_none());
    }
}
