//! Telemetry engine core
//!
//! [`TelemetryLogger`] owns all engine state: the entry buffer, the agent
//! state registry, the notification hub, and the file store. Ingestion is
//! total: a call below the minimum level is a pure no-op, and I/O failures
//! are downgraded to warning entries fed back through the same pipeline
//! (without triggering an inline flush, so a failing writer cannot recurse).
//!
//! Flushing follows a swap-then-process discipline: the buffer is replaced
//! with a fresh one under the lock, then the removed entries are grouped by
//! category and written outside it. Entries logged while a flush is writing
//! land in the new buffer and are picked up by the next cycle.

use crate::config::TelemetryConfig;
use crate::entry::{Category, LogEntry, LogLevel, LogSource, SystemSnapshot};
use crate::error::TelemetryResult;
use crate::notify::{NotificationHub, TelemetryEvent};
use crate::query::QueryCriteria;
use crate::sanitize::RedactionRules;
use crate::state::{AgentState, AgentStatePatch, AgentStateRegistry, HandoffRef};
use crate::storage::LogStore;
use chrono::Utc;
use serde_json::{json, Value};
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use uuid::Uuid;

/// Structured logging engine for multi-agent workflows
pub struct TelemetryLogger {
    config: TelemetryConfig,
    session_id: Uuid,
    started: Instant,
    rules: RedactionRules,
    store: Arc<LogStore>,
    registry: AgentStateRegistry,
    buffer: Mutex<Vec<LogEntry>>,
    hub: NotificationHub,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TelemetryLogger {
    /// Create an engine with its own state and storage root.
    /// Background flushing and rotation start with [`TelemetryLogger::start`].
    pub fn new(mut config: TelemetryConfig) -> TelemetryResult<Arc<Self>> {
        config.normalize();
        let store = Arc::new(LogStore::new(
            &config.log_root,
            config.max_file_size,
            config.max_files,
        )?);
        let hub = NotificationHub::new(config.notification_capacity);
        Ok(Arc::new(Self {
            config,
            session_id: Uuid::new_v4(),
            started: Instant::now(),
            rules: RedactionRules::default(),
            store,
            registry: AgentStateRegistry::new(),
            buffer: Mutex::new(Vec::new()),
            hub,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Spawn the periodic flush and rotation tasks
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        let logger = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(logger.config.flush_interval_ms));
            ticker.tick().await; // First tick completes immediately, skip it
            loop {
                ticker.tick().await;
                logger.flush().await;
            }
        }));

        let logger = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(logger.config.rotation_interval_ms));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                logger.rotate_now().await;
            }
        }));
    }

    /// Stop background tasks and run a final flush
    pub async fn shutdown(&self) {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
        self.flush().await;
    }

    /// Session identifier stamped on every entry from this engine
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Shared handle to the underlying file store
    pub fn store(&self) -> Arc<LogStore> {
        Arc::clone(&self.store)
    }

    /// Subscribe to entry and flush notifications
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TelemetryEvent> {
        self.hub.subscribe()
    }

    /// Number of entries currently buffered and not yet flushed
    pub async fn pending(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Record one entry at `level` from `source`
    pub async fn log(&self, level: LogLevel, source: LogSource, message: &str, context: Value) {
        self.record(level, source, message.to_string(), context, None, true)
            .await;
    }

    /// Record one entry carrying a caller-supplied correlation id
    pub async fn log_with_correlation(
        &self,
        level: LogLevel,
        source: LogSource,
        message: &str,
        context: Value,
        correlation_id: Uuid,
    ) {
        self.record(
            level,
            source,
            message.to_string(),
            context,
            Some(correlation_id),
            true,
        )
        .await;
    }

    pub async fn error(&self, source: LogSource, message: &str, context: Value) {
        self.log(LogLevel::Error, source, message, context).await;
    }

    pub async fn warn(&self, source: LogSource, message: &str, context: Value) {
        self.log(LogLevel::Warn, source, message, context).await;
    }

    pub async fn info(&self, source: LogSource, message: &str, context: Value) {
        self.log(LogLevel::Info, source, message, context).await;
    }

    pub async fn debug(&self, source: LogSource, message: &str, context: Value) {
        self.log(LogLevel::Debug, source, message, context).await;
    }

    pub async fn trace_event(&self, source: LogSource, message: &str, context: Value) {
        self.log(LogLevel::Trace, source, message, context).await;
    }

    /// Record an agent action, updating the agent's registry state first so
    /// the entry embeds the state the action produced
    pub async fn log_agent_action(&self, agent: &str, action: &str, context: Value) {
        self.registry
            .update(
                agent,
                AgentStatePatch {
                    status: Some("active".to_string()),
                    action: Some(action.to_string()),
                    ..Default::default()
                },
            )
            .await;
        self.log(
            LogLevel::Info,
            LogSource::Agent(agent.to_string()),
            &format!("Agent action: {action}"),
            context,
        )
        .await;
    }

    /// Record fresh performance metrics for an agent
    pub async fn log_agent_metrics(&self, agent: &str, metrics: Value) {
        self.registry
            .update(
                agent,
                AgentStatePatch {
                    metrics: Some(metrics.clone()),
                    ..Default::default()
                },
            )
            .await;
        self.log(
            LogLevel::Info,
            LogSource::Agent(agent.to_string()),
            "Agent metrics updated",
            metrics,
        )
        .await;
    }

    /// Record a work handoff, updating both agents' registry state
    pub async fn log_handoff(&self, from: &str, to: &str, reference: &str, context: Value) {
        let now = Utc::now();
        self.registry
            .update(
                from,
                AgentStatePatch {
                    outbound_handoff: Some(HandoffRef {
                        counterpart: to.to_string(),
                        reference: reference.to_string(),
                        timestamp: now,
                    }),
                    ..Default::default()
                },
            )
            .await;
        self.registry
            .update(
                to,
                AgentStatePatch {
                    inbound_handoff: Some(HandoffRef {
                        counterpart: from.to_string(),
                        reference: reference.to_string(),
                        timestamp: now,
                    }),
                    ..Default::default()
                },
            )
            .await;
        self.log(
            LogLevel::Info,
            LogSource::Handoff,
            &format!("Handoff from {from} to {to}"),
            json!({"from": from, "to": to, "reference": reference, "details": context}),
        )
        .await;
    }

    /// Latest known state for one agent
    pub async fn agent_state(&self, name: &str) -> Option<AgentState> {
        self.registry.get(name).await
    }

    /// Snapshot of all known agent states
    pub async fn agent_states(&self) -> Vec<AgentState> {
        self.registry.all().await
    }

    /// Swap the buffer and persist the removed entries, grouped by category.
    /// Emits a flush notification even when nothing was pending.
    pub async fn flush(&self) {
        let drained = { std::mem::take(&mut *self.buffer.lock().await) };
        let count = drained.len();

        if count > 0 {
            let mut groups: HashMap<Category, Vec<LogEntry>> = HashMap::new();
            for entry in drained {
                groups.entry(entry.source.category()).or_default().push(entry);
            }
            for (category, entries) in groups {
                if let Err(e) = self.store.append_batch(category, &entries) {
                    tracing::warn!(category = category.dir_name(), error = %e,
                        "Log write failed, batch dropped until next cycle");
                    self.record(
                        LogLevel::Warn,
                        LogSource::General("telemetry".to_string()),
                        format!("Log write failed for {}: {e}", category.dir_name()),
                        json!({}),
                        None,
                        false,
                    )
                    .await;
                }
            }
        }

        self.hub.emit(TelemetryEvent::Flush {
            count,
            timestamp: Utc::now(),
        });
    }

    /// Run one rotation pass across all categories
    pub async fn rotate_now(&self) {
        match self.store.rotate() {
            Ok(report) => {
                if report.deleted > 0 || report.archived > 0 {
                    tracing::debug!(
                        deleted = report.deleted,
                        archived = report.archived,
                        "Rotation pass complete"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rotation pass failed, retrying next cycle");
                self.record(
                    LogLevel::Warn,
                    LogSource::General("telemetry".to_string()),
                    format!("Log rotation failed: {e}"),
                    json!({}),
                    None,
                    false,
                )
                .await;
            }
        }
    }

    /// Full-scan query over every persisted entry file
    pub async fn query(&self, criteria: &QueryCriteria) -> Vec<LogEntry> {
        crate::query::run(&self.store, criteria)
    }

    async fn record(
        &self,
        level: LogLevel,
        source: LogSource,
        message: String,
        context: Value,
        correlation_id: Option<Uuid>,
        allow_inline_flush: bool,
    ) {
        if !level.passes(self.config.min_level) {
            return;
        }

        let context = self.rules.sanitize(&context);
        let agent_state = match source.agent_name() {
            Some(name) => self.registry.get(name).await,
            None => None,
        };
        let backtrace = matches!(level, LogLevel::Error | LogLevel::Debug)
            .then(|| Backtrace::force_capture().to_string());

        let entry = LogEntry {
            timestamp: Utc::now(),
            session_id: self.session_id,
            level,
            source,
            message,
            correlation_id: correlation_id.unwrap_or_else(Uuid::new_v4),
            context,
            system: SystemSnapshot::capture(self.started.elapsed().as_millis() as u64),
            backtrace,
            agent_state,
        };

        self.console_line(&entry);
        self.hub.emit(TelemetryEvent::Entry(Arc::new(entry.clone())));

        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(entry);
            allow_inline_flush && buffer.len() >= self.config.buffer_size
        };
        if should_flush {
            Box::pin(self.flush()).await;
        }
    }

    fn console_line(&self, entry: &LogEntry) {
        let source = entry.source.to_string();
        let correlation_id = entry.correlation_id;
        match entry.level {
            LogLevel::Error => {
                tracing::error!(source = %source, %correlation_id, "{}", entry.message)
            }
            LogLevel::Warn => {
                tracing::warn!(source = %source, %correlation_id, "{}", entry.message)
            }
            LogLevel::Info => {
                tracing::info!(source = %source, %correlation_id, "{}", entry.message)
            }
            LogLevel::Debug => {
                tracing::debug!(source = %source, %correlation_id, "{}", entry.message)
            }
            LogLevel::Trace => {
                tracing::trace!(source = %source, %correlation_id, "{}", entry.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_logger(tmp: &TempDir) -> Arc<TelemetryLogger> {
        TelemetryLogger::new(TelemetryConfig {
            log_root: tmp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_below_minimum_level_is_pure_noop() {
        let tmp = TempDir::new().unwrap();
        let logger = TelemetryLogger::new(TelemetryConfig {
            log_root: tmp.path().to_path_buf(),
            min_level: LogLevel::Warn,
            ..Default::default()
        })
        .unwrap();
        let mut rx = logger.subscribe();

        logger
            .info(LogSource::General("sys".to_string()), "dropped", json!({}))
            .await;

        assert_eq!(logger.pending().await, 0);
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_accepted_entry_is_buffered_and_notified() {
        let tmp = TempDir::new().unwrap();
        let logger = test_logger(&tmp);
        let mut rx = logger.subscribe();

        logger
            .warn(LogSource::Coordination, "queue depth high", json!({"depth": 9}))
            .await;

        assert_eq!(logger.pending().await, 1);
        match rx.try_recv().unwrap() {
            TelemetryEvent::Entry(entry) => {
                assert_eq!(entry.level, LogLevel::Warn);
                assert_eq!(entry.message, "queue depth high");
                assert_eq!(entry.context["depth"], 9);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_buffer_threshold_triggers_inline_flush() {
        let tmp = TempDir::new().unwrap();
        let logger = TelemetryLogger::new(TelemetryConfig {
            log_root: tmp.path().to_path_buf(),
            buffer_size: 2,
            ..Default::default()
        })
        .unwrap();

        logger
            .info(LogSource::General("sys".to_string()), "one", json!({}))
            .await;
        assert_eq!(logger.pending().await, 1);

        logger
            .info(LogSource::General("sys".to_string()), "two", json!({}))
            .await;
        assert_eq!(logger.pending().await, 0);
        assert!(logger.store().current_file(Category::General).exists());
    }

    #[tokio::test]
    async fn test_empty_flush_emits_notification_with_zero_count() {
        let tmp = TempDir::new().unwrap();
        let logger = test_logger(&tmp);
        let mut rx = logger.subscribe();

        logger.flush().await;

        match rx.try_recv().unwrap() {
            TelemetryEvent::Flush { count, .. } => assert_eq!(count, 0),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_entry_captures_backtrace() {
        let tmp = TempDir::new().unwrap();
        let logger = test_logger(&tmp);
        let mut rx = logger.subscribe();

        logger
            .error(LogSource::General("sys".to_string()), "boom", json!({}))
            .await;

        match rx.try_recv().unwrap() {
            TelemetryEvent::Entry(entry) => assert!(entry.backtrace.is_some()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_agent_action_enriches_entry_with_state() {
        let tmp = TempDir::new().unwrap();
        let logger = test_logger(&tmp);
        let mut rx = logger.subscribe();

        logger
            .log_agent_action("frontend-developer", "render-login-form", json!({"ticket": "T-42"}))
            .await;

        match rx.try_recv().unwrap() {
            TelemetryEvent::Entry(entry) => {
                let state = entry.agent_state.as_ref().expect("state embedded");
                assert_eq!(state.name, "frontend-developer");
                assert_eq!(state.last_action.as_deref(), Some("render-login-form"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handoff_updates_both_agents() {
        let tmp = TempDir::new().unwrap();
        let logger = test_logger(&tmp);

        logger
            .log_handoff("frontend-developer", "qa-engineer", "T-42", json!({}))
            .await;

        let from = logger.agent_state("frontend-developer").await.unwrap();
        let to = logger.agent_state("qa-engineer").await.unwrap();
        assert_eq!(
            from.last_outbound_handoff.unwrap().counterpart,
            "qa-engineer"
        );
        assert_eq!(
            to.last_inbound_handoff.unwrap().counterpart,
            "frontend-developer"
        );
    }

    #[tokio::test]
    async fn test_context_redaction_applies_on_ingest() {
        let tmp = TempDir::new().unwrap();
        let logger = test_logger(&tmp);
        let mut rx = logger.subscribe();

        logger
            .info(
                LogSource::General("sys".to_string()),
                "creds",
                json!({"password": "hunter2"}),
            )
            .await;

        match rx.try_recv().unwrap() {
            TelemetryEvent::Entry(entry) => {
                assert_eq!(entry.context["password"], crate::sanitize::REDACTED_MARKER);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
