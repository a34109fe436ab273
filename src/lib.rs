//! # vigil — Endpoint File-Triage Agent
//!
//! Watches user directories, triages newly arriving or modified files, and
//! enforces a response policy (simulate, rename-to-blocked, or quarantine).
//! Scan reports are delivered to a remote collector with at-least-once
//! semantics across process restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Agent                               │
//! │  ┌─────────┐   ┌───────────┐   ┌──────────┐   ┌───────────┐  │
//! │  │ Watcher │──▶│Orchestrate│──▶│  Policy  │──▶│RetrySender│  │
//! │  │ (notify)│   │ per event │   │  Engine  │   │  + spool  │  │
//! │  └─────────┘   └─────┬─────┘   └──────────┘   └─────┬─────┘  │
//! │                      │                              │        │
//! │        ┌─────────────▼──────────────┐        ┌──────▼──────┐ │
//! │        │ Fast signature │ Deep scan │        │  Transport  │ │
//! │        │ (entropy, ext, │ (bounded  │        │ (HTTP POST) │ │
//! │        │  keywords)     │  archive) │        └─────────────┘ │
//! │        └────────────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Capabilities
//!
//! - **Fast-signature triage**: deterministic additive scoring over magic
//!   bytes, extension class, entropy, and ASCII keyword hits
//! - **Safe archive scanning**: recursive ZIP traversal with depth,
//!   child-count, size, expansion-ratio, timeout, path-traversal, and
//!   encryption guards; hostile archives are quarantined, never trusted
//! - **Response policy**: severity threshold plus mode (simulate / rename /
//!   quarantine), with collision-safe renames and cross-volume fallbacks
//! - **Durable delivery**: in-memory FIFO with disk spool overflow, bounded
//!   exponential backoff, and crash recovery from the spool directory

pub mod agent;
pub mod analysis;
pub mod config;
pub mod engine;
pub mod policy;
pub mod queue;
pub mod report;
pub mod watch;

// Re-exports for convenience
pub use agent::Agent;
pub use analysis::{entropy_8bit, sha256_file, sha256_hex, FastSignature};
pub use config::AgentConfig;
pub use engine::{scan_archive, Action, Limits, PolicyContext, ScanContext, Severity};
pub use queue::{RetryCfg, RetrySender};
pub use report::{EventReport, HttpTransport, Transport};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("archive error: {0}")]
    Archive(String),

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("watch error: {0}")]
    Watch(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<zip::result::ZipError> for VigilError {
    fn from(e: zip::result::ZipError) -> Self {
        VigilError::Archive(e.to_string())
    }
}

pub type VigilResult<T> = Result<T, VigilError>;
