//! Event orchestrator
//!
//! Glue between the watcher and everything else. Per file event, on the
//! watcher's thread: stabilize, hash, fast-signature triage, deep scan for
//! archives, policy, then a report onto the retry queue. Every failure mode
//! is logged and swallowed; one bad file never takes the watcher down.

use crate::analysis::{entropy_8bit, extension_lower, read_head, sha256_file, FastSignature, HEAD_BYTES};
use crate::config::AgentConfig;
use crate::engine::{
    route_to_handler, scan_archive, Action, DetectHints, PolicyContext, ScanContext,
};
use crate::policy;
use crate::queue::RetrySender;
use crate::report::{hostname, now_ts, AgentInfo, EventReport, ReportMeta, ReportPolicy, AGENT_VERSION};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct Agent {
    cfg: AgentConfig,
    sender: Arc<RetrySender>,
}

impl Agent {
    pub fn new(cfg: AgentConfig, sender: Arc<RetrySender>) -> Self {
        Self { cfg, sender }
    }

    /// Handle one file event. Never panics, never propagates; the watcher
    /// thread calls this for every create/modify/rename-to.
    pub fn handle_event(&self, path: &Path, _created: bool, _modified: bool) {
        if !path.is_file() {
            return;
        }
        // A file still being written reports a moving size; a file that
        // disappears mid-write yields no report at all.
        if !file_stable(path, 3, Duration::from_millis(400)) {
            return;
        }

        let head = read_head(path, HEAD_BYTES);
        let entropy = entropy_8bit(&head);
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let sha256 = sha256_file(path).unwrap_or_default();
        let ext = extension_lower(path);

        let sig = FastSignature::scan(path, &head, entropy, size);
        let mut severity = sig.severity;

        let routed = route_to_handler(path);
        let hints = DetectHints {
            is_archive: routed.is_archive(),
            high_entropy: entropy >= self.cfg.entropy_high,
            ..Default::default()
        };
        let policy_ctx = PolicyContext {
            mode: self.cfg.policy_mode,
            min_severity: self.cfg.policy_min,
        };

        // Deep scan: archives go through the bounded recursive scanner. A
        // bomb-flagged parent is quarantined by the scan itself.
        let mut action = Action::Simulate;
        let mut target: Option<PathBuf> = None;
        let mut parent_handled = false;
        if routed.is_archive() {
            let mut ctx = ScanContext::new(
                self.cfg.limits,
                policy_ctx,
                self.cfg.temp_dir.clone(),
                self.cfg.quarantine_dir.clone(),
            );
            let scan_id = ctx.root_scan_id.clone();
            info!(scan_id = %scan_id, path = %path.display(), "deep scan");
            let (deep_action, deep_sev) = scan_archive(path, "", &mut ctx);
            severity = severity.max(deep_sev);
            if matches!(deep_action, Action::Quarantine | Action::Error) {
                action = deep_action;
                parent_handled = true;
            }
            let _ = fs::remove_dir_all(self.cfg.temp_dir.join(&scan_id));
        }

        info!(
            path = %path.display(),
            severity = %severity,
            min = %self.cfg.policy_min,
            mode = %self.cfg.policy_mode,
            "policy eval"
        );
        if !parent_handled {
            let ext_no_dot = ext.strip_prefix('.').unwrap_or(&ext);
            let chosen = policy::choose_action(severity, &policy_ctx, ext_no_dot, &hints);
            let applied = policy::apply_action(chosen, path, &self.cfg.quarantine_dir);
            action = applied.action;
            target = applied.target;
        }
        info!(path = %path.display(), action = %action, "policy result");

        let report = EventReport {
            kind: "agent_fast".to_string(),
            ts: now_ts(),
            path: path.to_string_lossy().into_owned(),
            meta: ReportMeta {
                sha256,
                size,
                ext,
                entropy,
                sig_score: sig.score,
                sig_reason: sig.reason,
                severity_fast: sig.severity,
            },
            policy: ReportPolicy {
                mode: self.cfg.policy_mode,
                min: self.cfg.policy_min,
                action,
                target: target.map(|t| t.to_string_lossy().into_owned()),
            },
            agent: AgentInfo {
                ver: AGENT_VERSION.to_string(),
                host: hostname(),
            },
            enqueue_deep_scan: true,
        };

        match report.render() {
            Ok(json) => self.sender.enqueue(json),
            Err(e) => error!(path = %path.display(), msg = %e, "report render failed"),
        }
    }
}

/// Poll the file size until two successive reads agree. Returns false when
/// the file cannot be read at all (it likely disappeared mid-event).
fn file_stable(path: &Path, tries: u32, delay: Duration) -> bool {
    let mut last: Option<u64> = None;
    for _ in 0..tries {
        let Ok(md) = fs::metadata(path) else {
            return false;
        };
        let now = md.len();
        if last == Some(now) {
            return true;
        }
        last = Some(now);
        std::thread::sleep(delay);
    }
    true
}
