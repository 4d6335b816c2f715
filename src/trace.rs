//! Distributed-trace lifecycles
//!
//! A [`Trace`] is a top-level timed operation composed of [`Span`]s, each
//! attributed to one agent. Traces live in the engine's active registry
//! until completed; completion computes summary statistics, persists the
//! full document to the traces directory, and removes the trace from
//! memory. Operations against unknown or completed ids fail softly: a
//! warning goes through the logging pipeline and the call reports
//! not-applied instead of raising.

use crate::entry::{LogLevel, LogSource};
use crate::logger::TelemetryLogger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use uuid::Uuid;

/// Lifecycle status shared by traces and spans; transitions one way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Active,
    Completed,
}

/// A timestamped event appended to a span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub context: Value,
}

/// A named, timed unit of work within a trace, attributed to one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: Uuid,
    pub name: String,
    pub agent: String,
    pub started_at: DateTime<Utc>,
    pub context: Value,
    pub events: Vec<TraceEvent>,
    pub status: LifecycleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Span {
    fn complete(&mut self, result: Value) {
        let ended = Utc::now();
        self.status = LifecycleStatus::Completed;
        // End time never precedes start time
        self.duration_ms = Some((ended - self.started_at).num_milliseconds().max(0));
        self.ended_at = Some(ended);
        self.result = Some(result);
    }
}

/// Statistics derived over a trace's spans at completion time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStats {
    pub span_count: usize,
    pub completed_span_count: usize,
    pub mean_completed_span_duration_ms: f64,
    /// Distinct participating agents, in first-seen order
    pub agents: Vec<String>,
    /// Share of the trace duration covered by completed spans, clamped to 100
    pub span_coverage_percent: f64,
}

/// A top-level timed operation spanning multiple agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: Uuid,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub context: Value,
    pub spans: Vec<Span>,
    pub status: LifecycleStatus,
    /// Correlation ids of communications linked to this trace
    pub correlation_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TraceStats>,
}

impl Trace {
    fn complete(&mut self, result: Value) {
        let ended = Utc::now();
        let duration_ms = (ended - self.started_at).num_milliseconds().max(0);
        self.status = LifecycleStatus::Completed;
        self.ended_at = Some(ended);
        self.duration_ms = Some(duration_ms);
        self.result = Some(result);
        self.stats = Some(compute_stats(&self.spans, duration_ms));
    }
}

fn compute_stats(spans: &[Span], trace_duration_ms: i64) -> TraceStats {
    let completed: Vec<&Span> = spans
        .iter()
        .filter(|s| s.status == LifecycleStatus::Completed)
        .collect();
    let duration_sum: i64 = completed.iter().filter_map(|s| s.duration_ms).sum();
    let mean = if completed.is_empty() {
        0.0
    } else {
        duration_sum as f64 / completed.len() as f64
    };

    let mut agents: Vec<String> = Vec::new();
    for span in spans {
        if !agents.contains(&span.agent) {
            agents.push(span.agent.clone());
        }
    }

    let span_coverage_percent = if trace_duration_ms > 0 {
        ((duration_sum as f64 / trace_duration_ms as f64) * 100.0).min(100.0)
    } else {
        0.0
    };

    TraceStats {
        span_count: spans.len(),
        completed_span_count: completed.len(),
        mean_completed_span_duration_ms: mean,
        agents,
        span_coverage_percent,
    }
}

/// Lightweight record of one inter-agent communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

/// Trace and correlation engine layered over a [`TelemetryLogger`]
///
/// Narrative lines (trace started, span ignored, trace completed) go through
/// the logger's normal ingestion path; trace documents are persisted
/// separately on completion.
pub struct TraceEngine {
    logger: Arc<TelemetryLogger>,
    active: RwLock<HashMap<Uuid, Trace>>,
    correlations: RwLock<HashMap<Uuid, CorrelationRecord>>,
    correlation_ttl: chrono::Duration,
    sweep_interval: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TraceEngine {
    pub fn new(logger: Arc<TelemetryLogger>) -> Arc<Self> {
        let config = logger.config();
        let correlation_ttl = chrono::Duration::milliseconds(config.correlation_ttl_ms as i64);
        let sweep_interval = Duration::from_millis(config.rotation_interval_ms);
        Arc::new(Self {
            logger,
            active: RwLock::new(HashMap::new()),
            correlations: RwLock::new(HashMap::new()),
            correlation_ttl,
            sweep_interval,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the periodic correlation sweep task
    pub async fn start(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        self.tasks.lock().await.push(tokio::spawn(async move {
            let mut ticker = interval(engine.sweep_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.sweep_correlations().await;
            }
        }));
    }

    pub async fn shutdown(&self) {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
    }

    /// Begin a trace, registering it as active. A caller-supplied id is
    /// honored; otherwise one is generated.
    pub async fn start_trace(&self, id: Option<Uuid>, operation: &str, context: Value) -> Uuid {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let trace = Trace {
            id,
            operation: operation.to_string(),
            started_at: Utc::now(),
            context,
            spans: Vec::new(),
            status: LifecycleStatus::Active,
            correlation_ids: Vec::new(),
            ended_at: None,
            duration_ms: None,
            result: None,
            stats: None,
        };
        self.active.write().await.insert(id, trace);
        self.logger
            .info(
                LogSource::Trace(id.to_string()),
                &format!("Trace started: {operation}"),
                json!({"operation": operation}),
            )
            .await;
        id
    }

    /// Add a span to an active trace. Returns the span id, or `None` when
    /// the trace is unknown or already completed.
    pub async fn add_span(
        &self,
        trace_id: Uuid,
        name: &str,
        agent: &str,
        context: Value,
    ) -> Option<Uuid> {
        let span_id = Uuid::new_v4();
        {
            let mut active = self.active.write().await;
            let Some(trace) = active.get_mut(&trace_id) else {
                drop(active);
                self.logger
                    .warn(
                        LogSource::Trace(trace_id.to_string()),
                        &format!("Span ignored: trace {trace_id} is not active"),
                        json!({"span_name": name, "agent": agent}),
                    )
                    .await;
                return None;
            };
            trace.spans.push(Span {
                id: span_id,
                name: name.to_string(),
                agent: agent.to_string(),
                started_at: Utc::now(),
                context,
                events: Vec::new(),
                status: LifecycleStatus::Active,
                ended_at: None,
                duration_ms: None,
                result: None,
            });
        }
        self.logger
            .debug(
                LogSource::Trace(trace_id.to_string()),
                &format!("Span started: {name}"),
                json!({"span_id": span_id, "agent": agent}),
            )
            .await;
        Some(span_id)
    }

    /// Append an event to a span. Returns whether the event was applied.
    pub async fn add_span_event(
        &self,
        trace_id: Uuid,
        span_id: Uuid,
        name: &str,
        context: Value,
    ) -> bool {
        let applied = {
            let mut active = self.active.write().await;
            active
                .get_mut(&trace_id)
                .and_then(|trace| trace.spans.iter_mut().find(|s| s.id == span_id))
                .map(|span| {
                    span.events.push(TraceEvent {
                        timestamp: Utc::now(),
                        name: name.to_string(),
                        context,
                    });
                })
                .is_some()
        };
        if !applied {
            self.logger
                .warn(
                    LogSource::Trace(trace_id.to_string()),
                    &format!("Span event ignored: unresolved trace {trace_id} or span {span_id}"),
                    json!({"event": name}),
                )
                .await;
        }
        applied
    }

    /// Complete a span, computing its duration and storing its result.
    /// Returns whether the span was found and completed.
    pub async fn end_span(&self, trace_id: Uuid, span_id: Uuid, result: Value) -> bool {
        let applied = {
            let mut active = self.active.write().await;
            active
                .get_mut(&trace_id)
                .and_then(|trace| trace.spans.iter_mut().find(|s| s.id == span_id))
                .map(|span| span.complete(result))
                .is_some()
        };
        if !applied {
            self.logger
                .warn(
                    LogSource::Trace(trace_id.to_string()),
                    &format!("Span end ignored: unresolved trace {trace_id} or span {span_id}"),
                    json!({}),
                )
                .await;
        }
        applied
    }

    /// Complete a trace: compute statistics over its spans, persist the
    /// document, and remove it from the active registry. Returns whether the
    /// trace was active.
    pub async fn end_trace(&self, trace_id: Uuid, result: Value) -> bool {
        let Some(mut trace) = self.active.write().await.remove(&trace_id) else {
            self.logger
                .warn(
                    LogSource::Trace(trace_id.to_string()),
                    &format!("Trace end ignored: trace {trace_id} is not active"),
                    json!({}),
                )
                .await;
            return false;
        };

        trace.complete(result);

        if let Err(e) = self.logger.store().write_trace_document(&trace) {
            self.logger
                .warn(
                    LogSource::Trace(trace_id.to_string()),
                    &format!("Trace document write failed: {e}"),
                    json!({}),
                )
                .await;
        }

        let stats = trace.stats.as_ref();
        self.logger
            .info(
                LogSource::Trace(trace_id.to_string()),
                &format!("Trace completed: {}", trace.operation),
                json!({
                    "duration_ms": trace.duration_ms,
                    "span_count": stats.map(|s| s.span_count),
                    "agents": stats.map(|s| s.agents.clone()),
                }),
            )
            .await;
        true
    }

    /// Record an inter-agent communication, generating a correlation id.
    /// When `trace_id` names an active trace the id is linked to it.
    pub async fn communicate(
        &self,
        from: &str,
        to: &str,
        message_type: &str,
        content: Value,
        trace_id: Option<Uuid>,
    ) -> Uuid {
        let correlation_id = Uuid::new_v4();
        let record = CorrelationRecord {
            id: correlation_id,
            from: from.to_string(),
            to: to.to_string(),
            message_type: message_type.to_string(),
            created_at: Utc::now(),
        };
        self.correlations
            .write()
            .await
            .insert(correlation_id, record);

        if let Some(trace_id) = trace_id {
            if let Some(trace) = self.active.write().await.get_mut(&trace_id) {
                trace.correlation_ids.push(correlation_id);
            }
        }

        self.logger
            .log_with_correlation(
                LogLevel::Info,
                LogSource::Communication,
                &format!("{from} -> {to}: {message_type}"),
                json!({"from": from, "to": to, "message_type": message_type, "content": content}),
                correlation_id,
            )
            .await;
        correlation_id
    }

    /// Remove and return a correlation record, for callers matching a
    /// response to its request
    pub async fn resolve_correlation(&self, id: Uuid) -> Option<CorrelationRecord> {
        self.correlations.write().await.remove(&id)
    }

    /// Evict correlation records older than the configured TTL.
    /// Returns the number of records removed.
    pub async fn sweep_correlations(&self) -> usize {
        let cutoff = Utc::now() - self.correlation_ttl;
        let mut correlations = self.correlations.write().await;
        let before = correlations.len();
        correlations.retain(|_, record| record.created_at >= cutoff);
        let swept = before - correlations.len();
        if swept > 0 {
            tracing::debug!(swept, "Evicted expired correlation records");
        }
        swept
    }

    /// Number of unresolved correlation records
    pub async fn correlation_count(&self) -> usize {
        self.correlations.read().await.len()
    }

    /// Snapshot of all currently active traces
    pub async fn active_traces(&self) -> Vec<Trace> {
        let mut traces: Vec<Trace> = self.active.read().await.values().cloned().collect();
        traces.sort_by_key(|t| t.started_at);
        traces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use tempfile::TempDir;

    async fn test_engine(tmp: &TempDir) -> (Arc<TelemetryLogger>, Arc<TraceEngine>) {
        let logger = TelemetryLogger::new(TelemetryConfig {
            log_root: tmp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        let engine = TraceEngine::new(Arc::clone(&logger));
        (logger, engine)
    }

    #[tokio::test]
    async fn test_start_trace_registers_active() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = test_engine(&tmp).await;

        let id = engine.start_trace(None, "checkout", json!({})).await;
        let traces = engine.active_traces().await;
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].id, id);
        assert_eq!(traces[0].status, LifecycleStatus::Active);
    }

    #[tokio::test]
    async fn test_caller_supplied_trace_id_is_honored() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = test_engine(&tmp).await;

        let supplied = Uuid::new_v4();
        let id = engine.start_trace(Some(supplied), "deploy", json!({})).await;
        assert_eq!(id, supplied);
    }

    #[tokio::test]
    async fn test_add_span_to_unknown_trace_returns_none() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = test_engine(&tmp).await;

        let span = engine
            .add_span(Uuid::new_v4(), "validate", "backend-developer", json!({}))
            .await;
        assert!(span.is_none());
    }

    #[tokio::test]
    async fn test_add_span_to_completed_trace_returns_none() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = test_engine(&tmp).await;

        let id = engine.start_trace(None, "checkout", json!({})).await;
        assert!(engine.end_trace(id, json!({})).await);

        let span = engine
            .add_span(id, "late", "backend-developer", json!({}))
            .await;
        assert!(span.is_none());
    }

    #[tokio::test]
    async fn test_span_event_on_unresolved_ids_is_noop() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = test_engine(&tmp).await;

        let id = engine.start_trace(None, "checkout", json!({})).await;
        assert!(
            !engine
                .add_span_event(id, Uuid::new_v4(), "missing-span", json!({}))
                .await
        );
        assert!(
            !engine
                .add_span_event(Uuid::new_v4(), Uuid::new_v4(), "missing-trace", json!({}))
                .await
        );
    }

    #[tokio::test]
    async fn test_stats_count_incomplete_spans() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = test_engine(&tmp).await;

        let id = engine.start_trace(None, "mixed", json!({})).await;
        let done = engine.add_span(id, "done", "a", json!({})).await.unwrap();
        let _open = engine.add_span(id, "open", "b", json!({})).await.unwrap();
        engine.end_span(id, done, json!({"ok": true})).await;
        engine.end_trace(id, json!({})).await;

        let path = tmp.path().join("traces").join(format!("trace-{id}.json"));
        let doc: Trace = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let stats = doc.stats.unwrap();
        // Span count reflects all attached spans, completed or not
        assert_eq!(stats.span_count, 2);
        assert_eq!(stats.completed_span_count, 1);
        assert_eq!(stats.agents, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_span_coverage_is_clamped() {
        let spans = vec![
            Span {
                id: Uuid::new_v4(),
                name: "s1".to_string(),
                agent: "a".to_string(),
                started_at: Utc::now(),
                context: json!({}),
                events: Vec::new(),
                status: LifecycleStatus::Completed,
                ended_at: Some(Utc::now()),
                duration_ms: Some(900),
                result: None,
            },
            Span {
                id: Uuid::new_v4(),
                name: "s2".to_string(),
                agent: "b".to_string(),
                started_at: Utc::now(),
                context: json!({}),
                events: Vec::new(),
                status: LifecycleStatus::Completed,
                ended_at: Some(Utc::now()),
                duration_ms: Some(900),
                result: None,
            },
        ];
        // Overlapping spans sum past the trace duration; coverage stays at 100
        let stats = compute_stats(&spans, 1000);
        assert_eq!(stats.span_coverage_percent, 100.0);
        assert_eq!(stats.mean_completed_span_duration_ms, 900.0);
    }

    #[tokio::test]
    async fn test_zero_duration_trace_has_zero_coverage() {
        let stats = compute_stats(&[], 0);
        assert_eq!(stats.span_coverage_percent, 0.0);
        assert_eq!(stats.span_count, 0);
    }

    #[tokio::test]
    async fn test_communicate_stores_and_resolves_correlation() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = test_engine(&tmp).await;

        let id = engine
            .communicate("frontend-developer", "backend-developer", "request", json!({}), None)
            .await;
        assert_eq!(engine.correlation_count().await, 1);

        let record = engine.resolve_correlation(id).await.unwrap();
        assert_eq!(record.from, "frontend-developer");
        assert_eq!(record.message_type, "request");
        assert_eq!(engine.correlation_count().await, 0);
        assert!(engine.resolve_correlation(id).await.is_none());
    }

    #[tokio::test]
    async fn test_communicate_links_correlation_to_active_trace() {
        let tmp = TempDir::new().unwrap();
        let (_, engine) = test_engine(&tmp).await;

        let trace_id = engine.start_trace(None, "checkout", json!({})).await;
        let correlation = engine
            .communicate("a", "b", "request", json!({}), Some(trace_id))
            .await;

        let traces = engine.active_traces().await;
        assert_eq!(traces[0].correlation_ids, vec![correlation]);
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired_records() {
        let tmp = TempDir::new().unwrap();
        let logger = TelemetryLogger::new(TelemetryConfig {
            log_root: tmp.path().to_path_buf(),
            correlation_ttl_ms: 60_000,
            ..Default::default()
        })
        .unwrap();
        let engine = TraceEngine::new(Arc::clone(&logger));

        let fresh = engine.communicate("a", "b", "request", json!({}), None).await;
        let stale = engine.communicate("b", "a", "response", json!({}), None).await;
        engine
            .correlations
            .write()
            .await
            .get_mut(&stale)
            .unwrap()
            .created_at = Utc::now() - chrono::Duration::minutes(5);

        assert_eq!(engine.sweep_correlations().await, 1);
        assert_eq!(engine.correlation_count().await, 1);
        assert!(engine.resolve_correlation(fresh).await.is_some());
    }
}
