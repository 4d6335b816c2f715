//! Retrospective query over persisted entries
//!
//! A query scans every entry file across all category directories, decodes
//! each line independently (unparsable or partial lines are skipped), and
//! retains entries satisfying every supplied criterion. This is an
//! O(total persisted lines) full scan per call: fine for a debugging tool,
//! unsuited to high log volumes without an index.

use crate::entry::{LogEntry, LogLevel};
use crate::storage::LogStore;
use chrono::{DateTime, Utc};

/// Criteria combined with AND; unset fields match everything
#[derive(Debug, Default, Clone)]
pub struct QueryCriteria {
    /// Exact level match
    pub level: Option<LogLevel>,
    /// Substring match on the rendered source
    pub source_contains: Option<String>,
    /// Substring match on the message
    pub message_contains: Option<String>,
    /// Substring match of an agent name against the rendered source
    pub agent_name: Option<String>,
    /// Inclusive lower timestamp bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper timestamp bound
    pub until: Option<DateTime<Utc>>,
}

impl QueryCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn source_contains(mut self, fragment: impl Into<String>) -> Self {
        self.source_contains = Some(fragment.into());
        self
    }

    pub fn message_contains(mut self, fragment: impl Into<String>) -> Self {
        self.message_contains = Some(fragment.into());
        self
    }

    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    pub fn since(mut self, bound: DateTime<Utc>) -> Self {
        self.since = Some(bound);
        self
    }

    pub fn until(mut self, bound: DateTime<Utc>) -> Self {
        self.until = Some(bound);
        self
    }

    /// Whether an entry satisfies every supplied criterion
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        let source = entry.source_string();
        if let Some(fragment) = &self.source_contains {
            if !source.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some(fragment) = &self.message_contains {
            if !entry.message.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some(name) = &self.agent_name {
            if !source.contains(name.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Scan every persisted file and return matching entries, newest first
pub fn run(store: &LogStore, criteria: &QueryCriteria) -> Vec<LogEntry> {
    let mut results = Vec::new();
    for path in store.all_log_files() {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable log file");
                continue;
            }
        };
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => {
                    if criteria.matches(&entry) {
                        results.push(entry);
                    }
                }
                Err(_) => {
                    // Malformed trailing or partial lines are expected; skip
                    tracing::trace!(path = %path.display(), "Skipping unparsable log line");
                }
            }
        }
    }
    results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{LogSource, SystemSnapshot};
    use serde_json::json;
    use uuid::Uuid;

    fn entry_at(level: LogLevel, source: LogSource, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            session_id: Uuid::new_v4(),
            level,
            source,
            message: message.to_string(),
            correlation_id: Uuid::new_v4(),
            context: json!({}),
            system: SystemSnapshot::capture(0),
            backtrace: None,
            agent_state: None,
        }
    }

    #[test]
    fn test_empty_criteria_matches_everything() {
        let entry = entry_at(LogLevel::Info, LogSource::Coordination, "anything");
        assert!(QueryCriteria::new().matches(&entry));
    }

    #[test]
    fn test_level_must_match_exactly() {
        let entry = entry_at(LogLevel::Warn, LogSource::Coordination, "m");
        assert!(QueryCriteria::new().level(LogLevel::Warn).matches(&entry));
        assert!(!QueryCriteria::new().level(LogLevel::Error).matches(&entry));
    }

    #[test]
    fn test_agent_name_matches_source_substring() {
        let entry = entry_at(
            LogLevel::Info,
            LogSource::Agent("frontend-developer".to_string()),
            "m",
        );
        assert!(QueryCriteria::new().agent_name("frontend").matches(&entry));
        assert!(!QueryCriteria::new().agent_name("backend").matches(&entry));
    }

    #[test]
    fn test_criteria_are_anded() {
        let entry = entry_at(
            LogLevel::Info,
            LogSource::Agent("qa-engineer".to_string()),
            "running suite",
        );
        let matching = QueryCriteria::new()
            .level(LogLevel::Info)
            .message_contains("suite")
            .agent_name("qa");
        assert!(matching.matches(&entry));

        let failing_one = QueryCriteria::new()
            .level(LogLevel::Info)
            .message_contains("deploy")
            .agent_name("qa");
        assert!(!failing_one.matches(&entry));
    }

    #[test]
    fn test_time_bounds_are_inclusive() {
        let entry = entry_at(LogLevel::Info, LogSource::Coordination, "m");
        let at = entry.timestamp;
        assert!(QueryCriteria::new().since(at).matches(&entry));
        assert!(QueryCriteria::new().until(at).matches(&entry));
        assert!(
            !QueryCriteria::new()
                .since(at + chrono::Duration::seconds(1))
                .matches(&entry)
        );
        assert!(
            !QueryCriteria::new()
                .until(at - chrono::Duration::seconds(1))
                .matches(&entry)
        );
    }
}
