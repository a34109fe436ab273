//! Agent configuration from the environment
//!
//! Everything has a default except the collector URL, which defaults to a
//! local development endpoint. Unknown enum values warn and fall back so a
//! typo in a deployment manifest degrades to the safe mode instead of
//! refusing to start.

use crate::engine::{Limits, Severity};
use crate::policy::PolicyMode;
use crate::{VigilError, VigilResult};
use std::env;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_url: String,
    pub token: String,
    pub policy_mode: PolicyMode,
    pub policy_min: Severity,
    pub quarantine_dir: PathBuf,
    pub spool_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub watch_paths: Vec<PathBuf>,
    pub recursive: bool,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Entropy above this sets the high-entropy detect hint.
    pub entropy_high: f64,
    pub limits: Limits,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000/events/push".to_string(),
            token: String::new(),
            policy_mode: PolicyMode::Simulate,
            policy_min: Severity::High,
            quarantine_dir: PathBuf::from("quarantine"),
            spool_dir: PathBuf::from("agent_spool"),
            temp_dir: env::temp_dir().join("vigil"),
            watch_paths: Vec::new(),
            recursive: true,
            min_backoff_ms: 500,
            max_backoff_ms: 15_000,
            entropy_high: 7.20,
            limits: Limits::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from `VIGIL_*` environment variables, filling in
    /// defaults for anything unset. Watch paths default to the user's
    /// Downloads, Desktop, and Documents directories.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("VIGIL_API_URL") {
            cfg.api_url = v;
        }
        if let Ok(v) = env::var("VIGIL_TOKEN") {
            cfg.token = v;
        }
        if let Ok(v) = env::var("VIGIL_POLICY") {
            match v.parse::<PolicyMode>() {
                Ok(mode) => cfg.policy_mode = mode,
                Err(()) => warn!(value = %v, "unknown policy mode, falling back to simulate"),
            }
        }
        if let Ok(v) = env::var("VIGIL_POLICY_MIN") {
            match v.parse::<Severity>() {
                Ok(min) => cfg.policy_min = min,
                Err(()) => warn!(value = %v, "unknown policy minimum, keeping high"),
            }
        }
        match env::var("VIGIL_QUARANTINE_DIR") {
            Ok(v) if !v.is_empty() => cfg.quarantine_dir = PathBuf::from(v),
            _ => {
                if let Ok(cwd) = env::current_dir() {
                    cfg.quarantine_dir = cwd.join("quarantine");
                }
            }
        }
        if let Ok(v) = env::var("VIGIL_SPOOL_DIR") {
            if !v.is_empty() {
                cfg.spool_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = env::var("VIGIL_WATCH_PATHS") {
            cfg.watch_paths = env::split_paths(&v).collect();
        }
        if let Ok(v) = env::var("VIGIL_RECURSIVE") {
            cfg.recursive = !matches!(v.to_lowercase().as_str(), "0" | "false" | "no");
        }
        if let Ok(v) = env::var("VIGIL_MIN_BACKOFF_MS") {
            match v.parse() {
                Ok(ms) => cfg.min_backoff_ms = ms,
                Err(_) => warn!(value = %v, "bad VIGIL_MIN_BACKOFF_MS, keeping default"),
            }
        }
        if let Ok(v) = env::var("VIGIL_MAX_BACKOFF_MS") {
            match v.parse() {
                Ok(ms) => cfg.max_backoff_ms = ms,
                Err(_) => warn!(value = %v, "bad VIGIL_MAX_BACKOFF_MS, keeping default"),
            }
        }
        if let Ok(v) = env::var("VIGIL_ENTROPY_HIGH") {
            match v.parse() {
                Ok(h) => cfg.entropy_high = h,
                Err(_) => warn!(value = %v, "bad VIGIL_ENTROPY_HIGH, keeping default"),
            }
        }

        if cfg.watch_paths.is_empty() {
            cfg.watch_paths = default_user_dirs();
        }
        cfg
    }

    /// Create the directories the agent cannot run without. Called once at
    /// startup; failure here is fatal by design.
    pub fn prepare_dirs(&self) -> VigilResult<()> {
        for (name, dir) in [
            ("quarantine", &self.quarantine_dir),
            ("spool", &self.spool_dir),
            ("temp", &self.temp_dir),
        ] {
            std::fs::create_dir_all(dir).map_err(|e| {
                VigilError::Config(format!("cannot create {name} dir {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }
}

/// Downloads, Desktop, and Documents under the user's home directory, where
/// hostile files usually land first. Missing directories are filtered out.
pub fn default_user_dirs() -> Vec<PathBuf> {
    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from);
    let Ok(home) = home else {
        return Vec::new();
    };
    ["Downloads", "Desktop", "Documents"]
        .iter()
        .map(|d| home.join(d))
        .filter(|p| p.is_dir())
        .collect()
}
