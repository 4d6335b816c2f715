//! Context sanitization
//!
//! Before a context value is attached to an entry it is recursively copied
//! with three bounds applied: keys matching the redaction deny-list have
//! their values replaced, nesting deeper than the depth limit is cut off,
//! and collections wider than the breadth limit are truncated. The copy
//! never fails; anything that cannot be represented degrades to a marker.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Marker substituted for values under deny-listed keys
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Marker substituted for structure beyond the depth or breadth limits
pub const TRUNCATED_MARKER: &str = "[TRUNCATED]";

static DENY_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|key|secret|credential)").unwrap());

/// Redaction and truncation rules applied to every context value
#[derive(Debug, Clone)]
pub struct RedactionRules {
    /// Maximum nesting depth copied before truncation
    pub max_depth: usize,
    /// Maximum entries copied per object or array
    pub max_breadth: usize,
}

impl Default for RedactionRules {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_breadth: 1000,
        }
    }
}

impl RedactionRules {
    /// Whether a key's value must be replaced by the redaction marker
    pub fn is_denied(&self, key: &str) -> bool {
        DENY_LIST.is_match(key)
    }

    /// Produce a sanitized copy of `value`
    pub fn sanitize(&self, value: &Value) -> Value {
        self.sanitize_at(value, 0)
    }

    fn sanitize_at(&self, value: &Value, depth: usize) -> Value {
        match value {
            Value::Object(map) => {
                if depth >= self.max_depth {
                    return Value::String(TRUNCATED_MARKER.to_string());
                }
                let mut out = Map::with_capacity(map.len().min(self.max_breadth));
                for (i, (key, val)) in map.iter().enumerate() {
                    if i >= self.max_breadth {
                        out.insert(
                            "_truncated".to_string(),
                            Value::String(TRUNCATED_MARKER.to_string()),
                        );
                        break;
                    }
                    if self.is_denied(key) {
                        out.insert(key.clone(), Value::String(REDACTED_MARKER.to_string()));
                    } else {
                        out.insert(key.clone(), self.sanitize_at(val, depth + 1));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                if depth >= self.max_depth {
                    return Value::String(TRUNCATED_MARKER.to_string());
                }
                let mut out = Vec::with_capacity(items.len().min(self.max_breadth));
                for (i, item) in items.iter().enumerate() {
                    if i >= self.max_breadth {
                        out.push(Value::String(TRUNCATED_MARKER.to_string()));
                        break;
                    }
                    out.push(self.sanitize_at(item, depth + 1));
                }
                Value::Array(out)
            }
            scalar => scalar.clone(),
        }
    }
}
