//! Retry queue — durable delivery of event reports
//!
//! In-memory FIFO with a disk spool for overflow and for anything that has
//! ever failed a send. The worker retries forever with bounded exponential
//! backoff; durability wins over freshness. A payload is only ever dropped
//! after a 2xx acknowledgement, and every unacknowledged payload that has
//! failed once (or overflowed memory) has a spool file on disk, so a crash
//! loses nothing: startup recovery re-queues the spool directory.

use crate::report::Transport;
use crate::{VigilError, VigilResult};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry queue configuration.
#[derive(Debug, Clone)]
pub struct RetryCfg {
    pub api_url: String,
    pub token: String,
    pub spool_dir: PathBuf,
    /// Queue length past which new payloads are spooled to disk on enqueue.
    pub max_in_mem: usize,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryCfg {
    pub fn new(api_url: impl Into<String>, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_url: api_url.into(),
            token: String::new(),
            spool_dir: spool_dir.into(),
            max_in_mem: 1024,
            min_backoff_ms: 500,
            max_backoff_ms: 15_000,
        }
    }
}

/// One queued payload. `spool_path` names the on-disk copy, present whenever
/// the item overflowed memory or has failed at least one send.
#[derive(Debug, Clone)]
struct RetryItem {
    json: String,
    spool_path: Option<PathBuf>,
    attempts: u32,
}

struct Shared {
    cfg: RetryCfg,
    transport: Box<dyn Transport>,
    queue: Mutex<VecDeque<RetryItem>>,
    cv: Condvar,
    stop: AtomicBool,
}

/// Thread-safe sender with a single worker draining the queue.
pub struct RetrySender {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl RetrySender {
    /// Build the sender and ensure the spool directory exists. Failure to
    /// create it is fatal: without a spool there is no durability story.
    pub fn new(cfg: RetryCfg, transport: Box<dyn Transport>) -> VigilResult<Self> {
        fs::create_dir_all(&cfg.spool_dir).map_err(|e| {
            VigilError::Config(format!(
                "cannot create spool dir {}: {e}",
                cfg.spool_dir.display()
            ))
        })?;
        Ok(Self {
            shared: Arc::new(Shared {
                cfg,
                transport,
                queue: Mutex::new(VecDeque::new()),
                cv: Condvar::new(),
                stop: AtomicBool::new(false),
            }),
            worker: None,
        })
    }

    /// Recover spooled payloads from a previous run, then start the worker.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        self.shared.stop.store(false, Ordering::SeqCst);
        let recovered = load_spool(&self.shared.cfg.spool_dir);
        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovered spooled reports");
            let mut q = self.shared.queue.lock().unwrap();
            q.extend(recovered);
        }
        let shared = Arc::clone(&self.shared);
        self.worker = Some(std::thread::spawn(move || worker_loop(shared)));
        self.shared.cv.notify_all();
    }

    /// Stop the worker and join it. In-flight items stay on disk and are
    /// recovered on the next start.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.cv.notify_all();
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }

    /// Queue a payload for delivery. When the in-memory queue is full the
    /// payload is written to the spool first so it survives a crash even
    /// before its first send attempt.
    pub fn enqueue(&self, json: String) {
        let mut item = RetryItem {
            json,
            spool_path: None,
            attempts: 0,
        };
        {
            let mut q = self.shared.queue.lock().unwrap();
            if q.len() >= self.shared.cfg.max_in_mem {
                match write_spool_file(&self.shared.cfg.spool_dir, &item.json) {
                    Ok(p) => item.spool_path = Some(p),
                    Err(e) => warn!(msg = %e, "spool overflow write failed"),
                }
            }
            q.push_back(item);
        }
        self.shared.cv.notify_one();
    }

    /// Current queue length; used by tests and status logging.
    pub fn len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for RetrySender {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let item = {
            let mut q = shared.queue.lock().unwrap();
            loop {
                if shared.stop.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(item) = q.pop_front() {
                    break item;
                }
                q = shared.cv.wait(q).unwrap();
            }
        };

        let resp = shared
            .transport
            .post(&shared.cfg.api_url, &item.json, &shared.cfg.token);

        if resp.ok && (200..300).contains(&resp.status) {
            debug!(status = resp.status, "report delivered");
            if let Some(p) = &item.spool_path {
                let _ = fs::remove_file(p);
            }
            continue;
        }

        let mut item = item;
        item.attempts += 1;
        warn!(
            status = resp.status,
            attempts = item.attempts,
            ok = resp.ok,
            "delivery failed, backing off"
        );
        // Durability before sleep: the payload must be on disk before we
        // spend any time waiting.
        if item.spool_path.is_none() {
            match write_spool_file(&shared.cfg.spool_dir, &item.json) {
                Ok(p) => item.spool_path = Some(p),
                Err(e) => warn!(msg = %e, "spool write failed"),
            }
        }
        let backoff = backoff_ms(
            shared.cfg.min_backoff_ms,
            shared.cfg.max_backoff_ms,
            item.attempts,
        );
        let stopped = sleep_interruptible(Duration::from_millis(backoff), &shared.stop);

        {
            let mut q = shared.queue.lock().unwrap();
            q.push_back(item);
        }
        shared.cv.notify_one();
        if stopped {
            return;
        }
    }
}

/// `min(max, min × 2^min(attempts, 5))`.
fn backoff_ms(min: u64, max: u64, attempts: u32) -> u64 {
    let shift = attempts.min(5);
    min.saturating_mul(1u64 << shift).min(max)
}

/// Sleep in short slices so shutdown does not wait out a full backoff.
/// Returns true when the stop flag was raised.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) -> bool {
    let slice = Duration::from_millis(25);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    stop.load(Ordering::SeqCst)
}

fn write_spool_file(spool_dir: &Path, json: &str) -> VigilResult<PathBuf> {
    let ts = chrono::Utc::now().timestamp_millis();
    let mut path = spool_dir.join(format!("spool_{ts}.json"));
    let mut i = 0u32;
    while path.exists() {
        i += 1;
        path = spool_dir.join(format!("spool_{ts}_{i}.json"));
    }
    fs::write(&path, json)?;
    Ok(path)
}

fn load_spool(spool_dir: &Path) -> Vec<RetryItem> {
    let mut items = Vec::new();
    let entries = match fs::read_dir(spool_dir) {
        Ok(e) => e,
        Err(_) => return items,
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == "json"))
        .collect();
    paths.sort();
    for path in paths {
        match fs::read_to_string(&path) {
            Ok(json) => items.push(RetryItem {
                json,
                spool_path: Some(path),
                attempts: 0,
            }),
            Err(e) => warn!(path = %path.display(), msg = %e, "unreadable spool file"),
        }
    }
    items
}
