//! Retry queue durability and ordering
//!
//! The contract under test: FIFO delivery, spool overflow, unbounded retry
//! with backoff, and at-least-once delivery across a simulated process
//! restart (stop → new sender over the same spool directory).

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vigil::queue::{RetryCfg, RetrySender};
use vigil::report::{Transport, TransportResponse};

/// Transport double: answers with a fixed status and records every request.
#[derive(Clone)]
struct FixedTransport {
    status: u16,
    ok: bool,
    requests: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl FixedTransport {
    fn new(status: u16) -> Self {
        Self {
            status,
            ok: true,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn network_error() -> Self {
        Self {
            status: 0,
            ok: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Vec<(String, String, String)> {
        self.requests.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for FixedTransport {
    fn post(&self, url: &str, body: &str, token: &str) -> TransportResponse {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body.to_string(), token.to_string()));
        TransportResponse {
            ok: self.ok,
            status: self.status,
            body: String::new(),
        }
    }
}

fn fast_cfg(spool: &Path) -> RetryCfg {
    let mut cfg = RetryCfg::new("http://collector.test/events/push", spool);
    cfg.token = "sekrit".to_string();
    cfg.min_backoff_ms = 5;
    cfg.max_backoff_ms = 20;
    cfg
}

fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed().as_millis() < u128::from(deadline_ms) {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn spool_files(dir: &Path) -> Vec<std::path::PathBuf> {
    fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map_or(false, |e| e == "json"))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn delivery_preserves_fifo_order() {
    let dir = TempDir::new().unwrap();
    let transport = FixedTransport::new(200);
    let probe = transport.clone();
    let mut sender = RetrySender::new(fast_cfg(dir.path()), Box::new(transport)).unwrap();
    sender.start();

    for i in 0..5 {
        sender.enqueue(format!("{{\"n\":{i}}}"));
    }
    assert!(wait_until(2000, || probe.count() == 5));
    sender.stop();

    let bodies: Vec<String> = probe.requests().into_iter().map(|(_, b, _)| b).collect();
    let expected: Vec<String> = (0..5).map(|i| format!("{{\"n\":{i}}}")).collect();
    assert_eq!(bodies, expected);
    assert!(spool_files(dir.path()).is_empty());
}

#[test]
fn token_and_url_reach_the_transport() {
    let dir = TempDir::new().unwrap();
    let transport = FixedTransport::new(200);
    let probe = transport.clone();
    let mut sender = RetrySender::new(fast_cfg(dir.path()), Box::new(transport)).unwrap();
    sender.start();
    sender.enqueue("{}".to_string());
    assert!(wait_until(2000, || probe.count() == 1));
    sender.stop();

    let (url, _, token) = probe.requests().remove(0);
    assert_eq!(url, "http://collector.test/events/push");
    assert_eq!(token, "sekrit");
}

#[test]
fn failing_item_spools_and_retries_with_attempts() {
    let dir = TempDir::new().unwrap();
    let transport = FixedTransport::new(503);
    let probe = transport.clone();
    let mut sender = RetrySender::new(fast_cfg(dir.path()), Box::new(transport)).unwrap();
    sender.start();
    sender.enqueue("{\"n\":1}".to_string());

    // Several attempts happen and the payload is on disk between them.
    assert!(wait_until(3000, || probe.count() >= 3));
    assert_eq!(spool_files(dir.path()).len(), 1);
    sender.stop();

    // Still queued or spooled after stop: nothing was lost, nothing acked.
    assert_eq!(spool_files(dir.path()).len(), 1);
}

#[test]
fn network_errors_are_retried_like_bad_status() {
    let dir = TempDir::new().unwrap();
    let transport = FixedTransport::network_error();
    let probe = transport.clone();
    let mut sender = RetrySender::new(fast_cfg(dir.path()), Box::new(transport)).unwrap();
    sender.start();
    sender.enqueue("{\"n\":1}".to_string());
    assert!(wait_until(3000, || probe.count() >= 2));
    assert_eq!(spool_files(dir.path()).len(), 1);
    sender.stop();
}

#[test]
fn restart_recovers_spool_and_delivers_exactly_once() {
    let dir = TempDir::new().unwrap();
    let body = "{\"kind\":\"agent_fast\",\"n\":42}";

    // Phase 1: collector is down (503); let a few backoff cycles pass, then
    // "kill" the process by stopping and dropping the sender.
    {
        let transport = FixedTransport::new(503);
        let probe = transport.clone();
        let mut sender = RetrySender::new(fast_cfg(dir.path()), Box::new(transport)).unwrap();
        sender.start();
        sender.enqueue(body.to_string());
        assert!(wait_until(3000, || probe.count() >= 3));
        sender.stop();
    }
    let stranded = spool_files(dir.path());
    assert_eq!(stranded.len(), 1, "unacked payload must be spooled");
    assert_eq!(fs::read_to_string(&stranded[0]).unwrap(), body);

    // Phase 2: restart against a healthy collector.
    let transport = FixedTransport::new(200);
    let probe = transport.clone();
    let mut sender = RetrySender::new(fast_cfg(dir.path()), Box::new(transport)).unwrap();
    sender.start();

    assert!(wait_until(3000, || probe.count() >= 1
        && spool_files(dir.path()).is_empty()));
    sender.stop();

    let requests = probe.requests();
    assert_eq!(requests.len(), 1, "delivered exactly once after recovery");
    assert_eq!(requests[0].1, body, "recovered body must be byte-identical");
}

#[test]
fn restart_with_n_spool_files_requeues_all_bodies() {
    let dir = TempDir::new().unwrap();

    // Strand three payloads by hand, the way a crashed process would.
    for i in 0..3 {
        fs::write(
            dir.path().join(format!("spool_17000000000{i}.json")),
            format!("{{\"n\":{i}}}"),
        )
        .unwrap();
    }

    let transport = FixedTransport::new(200);
    let probe = transport.clone();
    let mut sender = RetrySender::new(fast_cfg(dir.path()), Box::new(transport)).unwrap();
    sender.start();

    assert!(wait_until(3000, || probe.count() == 3
        && spool_files(dir.path()).is_empty()));
    sender.stop();

    let mut bodies: Vec<String> = probe.requests().into_iter().map(|(_, b, _)| b).collect();
    bodies.sort();
    assert_eq!(bodies, vec!["{\"n\":0}", "{\"n\":1}", "{\"n\":2}"]);
}

#[test]
fn overflow_spools_new_payloads_before_first_send() {
    let dir = TempDir::new().unwrap();
    let mut cfg = fast_cfg(dir.path());
    cfg.max_in_mem = 2;
    let transport = FixedTransport::new(200);
    // Worker not started: queue fills, overflow goes to disk immediately.
    let sender = RetrySender::new(cfg, Box::new(transport)).unwrap();

    for i in 0..4 {
        sender.enqueue(format!("{{\"n\":{i}}}"));
    }
    assert_eq!(sender.len(), 4);
    assert_eq!(
        spool_files(dir.path()).len(),
        2,
        "payloads past max_in_mem must be durable before any send"
    );
}
