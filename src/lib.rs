//! agentlog - structured logging and distributed tracing for multi-agent workflows
//!
//! # Overview
//!
//! This crate provides a single-process telemetry engine for systems composed
//! of many concurrently-acting logical agents:
//! - Structured, sanitized log entries buffered and persisted as NDJSON
//! - A last-writer-wins registry of per-agent state used to enrich entries
//! - Traces composed of timed spans across agent boundaries, persisted as
//!   standalone documents on completion
//! - Correlation records linking request-like entries to their responses
//! - A full-scan query engine over everything persisted
//!
//! # Quick Start
//!
//! ```rust
//! use agentlog::{LogSource, TelemetryConfig, TelemetryLogger};
//! use serde_json::json;
//!
//! tokio_test::block_on(async {
//!     let dir = tempfile::tempdir().unwrap();
//!     let logger = TelemetryLogger::new(TelemetryConfig {
//!         log_root: dir.path().to_path_buf(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//!     logger
//!         .log_agent_action("frontend-developer", "render-login-form", json!({"ticket": "T-42"}))
//!         .await;
//!     logger
//!         .info(LogSource::Coordination, "sprint sync complete", json!({}))
//!         .await;
//!     logger.flush().await;
//! });
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod logger;
pub mod notify;
pub mod observability;
pub mod query;
pub mod sanitize;
pub mod state;
pub mod storage;
pub mod trace;

pub use config::TelemetryConfig;
pub use entry::{Category, LogEntry, LogLevel, LogSource, SystemSnapshot};
pub use error::{TelemetryError, TelemetryResult};
pub use logger::TelemetryLogger;
pub use notify::TelemetryEvent;
pub use query::QueryCriteria;
pub use sanitize::RedactionRules;
pub use state::{AgentState, AgentStatePatch, AgentStateRegistry, HandoffRef};
pub use storage::LogStore;
pub use trace::{CorrelationRecord, LifecycleStatus, Span, Trace, TraceEngine, TraceEvent, TraceStats};
