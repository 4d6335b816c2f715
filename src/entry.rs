//! Structured log entries and their typed sources
//!
//! Every accepted log call produces one immutable [`LogEntry`]. The source is
//! a typed tag that carries its destination [`Category`] explicitly, so file
//! routing never depends on parsing a string at write time. Persisted entries
//! render the source in `kind:name` form and parse it back on decode, which
//! keeps the NDJSON lines greppable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Severity levels, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Numeric severity rank; higher is more severe
    pub fn severity(self) -> u8 {
        match self {
            LogLevel::Error => 4,
            LogLevel::Warn => 3,
            LogLevel::Info => 2,
            LogLevel::Debug => 1,
            LogLevel::Trace => 0,
        }
    }

    /// Whether a call at this level passes the configured minimum
    pub fn passes(self, min: LogLevel) -> bool {
        self.severity() >= min.severity()
    }

    /// Parse a level from a string, defaulting to `Info` for unknown input
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

/// Destination log grouping for persisted entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Agents,
    Workflows,
    Coordination,
    Traces,
    General,
}

impl Category {
    /// All categories, in directory-scan order
    pub const ALL: [Category; 5] = [
        Category::Agents,
        Category::Workflows,
        Category::Coordination,
        Category::Traces,
        Category::General,
    ];

    /// Directory (and file prefix) name for this category
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Agents => "agents",
            Category::Workflows => "workflows",
            Category::Coordination => "coordination",
            Category::Traces => "traces",
            Category::General => "general",
        }
    }
}

/// Typed source of a log entry, tagged with its destination category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// An individual agent, e.g. `agent:frontend-developer`
    Agent(String),
    /// A named workflow, e.g. `workflow:release`
    Workflow(String),
    /// Inter-agent communication
    Communication,
    /// Work handoff between agents
    Handoff,
    /// Multi-agent coordination events
    Coordination,
    /// Narrative lines attributed to a trace, e.g. `trace:<id>`
    Trace(String),
    /// Anything else, e.g. `system`
    General(String),
}

impl LogSource {
    /// Destination category for entries from this source
    pub fn category(&self) -> Category {
        match self {
            LogSource::Agent(_) => Category::Agents,
            LogSource::Workflow(_) => Category::Workflows,
            LogSource::Communication | LogSource::Handoff | LogSource::Coordination => {
                Category::Coordination
            }
            LogSource::Trace(_) => Category::Traces,
            LogSource::General(_) => Category::General,
        }
    }

    /// Agent name when this source is an agent, for state enrichment
    pub fn agent_name(&self) -> Option<&str> {
        match self {
            LogSource::Agent(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Agent(name) => write!(f, "agent:{name}"),
            LogSource::Workflow(name) => write!(f, "workflow:{name}"),
            LogSource::Communication => f.write_str("communication"),
            LogSource::Handoff => f.write_str("handoff"),
            LogSource::Coordination => f.write_str("coordination"),
            LogSource::Trace(id) => write!(f, "trace:{id}"),
            LogSource::General(name) => f.write_str(name),
        }
    }
}

impl From<LogSource> for String {
    fn from(source: LogSource) -> Self {
        source.to_string()
    }
}

impl From<String> for LogSource {
    fn from(s: String) -> Self {
        if let Some(name) = s.strip_prefix("agent:") {
            LogSource::Agent(name.to_string())
        } else if let Some(name) = s.strip_prefix("workflow:") {
            LogSource::Workflow(name.to_string())
        } else if let Some(id) = s.strip_prefix("trace:") {
            LogSource::Trace(id.to_string())
        } else {
            match s.as_str() {
                "communication" => LogSource::Communication,
                "handoff" => LogSource::Handoff,
                "coordination" => LogSource::Coordination,
                _ => LogSource::General(s),
            }
        }
    }
}

impl Serialize for LogSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(LogSource::from(String::deserialize(deserializer)?))
    }
}

/// Point-in-time process information captured with every entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSnapshot {
    pub pid: u32,
    pub hostname: String,
    pub platform: String,
    /// Resident set size in kilobytes, when the platform exposes it
    pub memory_kb: Option<u64>,
    /// Milliseconds since the engine was constructed
    pub uptime_ms: u64,
}

impl SystemSnapshot {
    /// Capture the current process state
    pub fn capture(uptime_ms: u64) -> Self {
        Self {
            pid: std::process::id(),
            hostname: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            platform: std::env::consts::OS.to_string(),
            memory_kb: resident_memory_kb(),
            uptime_ms,
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_kb() -> Option<u64> {
    None
}

/// A single structured log record, immutable once built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub level: LogLevel,
    pub source: LogSource,
    pub message: String,
    pub correlation_id: Uuid,
    pub context: Value,
    pub system: SystemSnapshot,
    /// Call-site backtrace, captured for error and debug entries only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
    /// State of the originating agent at enrichment time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_state: Option<crate::state::AgentState>,
}

impl LogEntry {
    /// Rendered source string, as persisted on disk
    pub fn source_string(&self) -> String {
        self.source.to_string()
    }
}
