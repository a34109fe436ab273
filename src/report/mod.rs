//! Event reports and the collector transport
//!
//! One JSON object per file event. The shape is part of the collector
//! contract; field names and nesting are stable. Delivery goes through the
//! [`Transport`] trait so the retry queue can be tested without a network.

use crate::engine::{Action, Severity};
use crate::policy::PolicyMode;
use crate::{VigilError, VigilResult};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ─── Payload ───────────────────────────────────────────────────────

/// Per-file scan report, serialized as the collector payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventReport {
    /// Payload discriminator, always `"agent_fast"` for this pipeline.
    pub kind: String,
    /// Unix seconds, fractional.
    pub ts: f64,
    pub path: String,
    pub meta: ReportMeta,
    pub policy: ReportPolicy,
    pub agent: AgentInfo,
    /// The collector schedules its own deep scan for every fast report.
    pub enqueue_deep_scan: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub sha256: String,
    pub size: u64,
    /// Lowercase extension including the dot, empty when absent.
    pub ext: String,
    pub entropy: f64,
    pub sig_score: f64,
    pub sig_reason: String,
    pub severity_fast: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPolicy {
    pub mode: PolicyMode,
    pub min: Severity,
    pub action: Action,
    /// New location after a move/rename; omitted when nothing moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub ver: String,
    pub host: String,
}

impl EventReport {
    pub fn render(&self) -> VigilResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Current unix time as fractional seconds.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Hostname for report attribution, from the environment.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

// ─── Transport ─────────────────────────────────────────────────────

/// Outcome of one delivery attempt. `ok` is transport-level success; the
/// HTTP status is judged separately by the retry queue.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub ok: bool,
    pub status: u16,
    pub body: String,
}

/// Collector delivery primitive.
pub trait Transport: Send + Sync {
    fn post(&self, url: &str, body: &str, token: &str) -> TransportResponse;
}

/// Blocking HTTP transport. Sends `POST` with a JSON content type and, when
/// a token is configured, the `X-Agent-Token` header.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> VigilResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| VigilError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &str, body: &str, token: &str) -> TransportResponse {
        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string());
        if !token.is_empty() {
            req = req.header("X-Agent-Token", token);
        }
        match req.send() {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().unwrap_or_default();
                TransportResponse {
                    ok: true,
                    status,
                    body,
                }
            }
            Err(e) => TransportResponse {
                ok: false,
                status: 0,
                body: e.to_string(),
            },
        }
    }
}
