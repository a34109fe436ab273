//! Agent binary: wire config, retry sender, and watchers together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vigil::queue::RetryCfg;
use vigil::report::HttpTransport;
use vigil::{watch, Agent, AgentConfig, RetrySender, VigilError, VigilResult};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!(msg = %e, "fatal");
        std::process::exit(1);
    }
}

fn run() -> VigilResult<()> {
    let mut cfg = AgentConfig::from_env();
    // Extra non-flag arguments are additional watch paths.
    for arg in std::env::args().skip(1) {
        if !arg.starts_with("--") {
            cfg.watch_paths.push(PathBuf::from(arg));
        }
    }
    cfg.prepare_dirs()?;

    let transport = HttpTransport::new()?;
    let retry_cfg = RetryCfg {
        api_url: cfg.api_url.clone(),
        token: cfg.token.clone(),
        spool_dir: cfg.spool_dir.clone(),
        max_in_mem: 1024,
        min_backoff_ms: cfg.min_backoff_ms,
        max_backoff_ms: cfg.max_backoff_ms,
    };
    let mut sender = RetrySender::new(retry_cfg, Box::new(transport))?;
    sender.start();
    let sender = Arc::new(sender);

    info!(url = %cfg.api_url, ver = vigil::report::AGENT_VERSION, "agent starting");
    info!(mode = %cfg.policy_mode, min = %cfg.policy_min, "policy");
    info!(dir = %cfg.quarantine_dir.display(), "quarantine");
    info!(dir = %cfg.spool_dir.display(), "spool");

    let agent = Arc::new(Agent::new(cfg.clone(), Arc::clone(&sender)));
    let mut handles = Vec::new();
    for dir in &cfg.watch_paths {
        let agent = Arc::clone(&agent);
        let cb: watch::FileEventCallback =
            Arc::new(move |path: &Path, created, modified| agent.handle_event(path, created, modified));
        match watch::watch_directory(dir, cfg.recursive, cb) {
            Ok(handle) => {
                info!(dir = %dir.display(), recursive = cfg.recursive, "watching");
                handles.push(handle);
            }
            Err(e) => error!(dir = %dir.display(), msg = %e, "watch failed"),
        }
    }
    if handles.is_empty() {
        return Err(VigilError::Watch("no watchable directories".to_string()));
    }

    info!("running, Ctrl+C to exit");
    for handle in handles {
        handle.join();
    }
    Ok(())
}
