//! Agent state registry
//!
//! Tracks the latest known state of every agent the engine has seen. Records
//! are created on first reference with `unknown` status, merged last-writer-wins
//! on every update, and never deleted for the life of the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Reference to a work handoff between two agents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffRef {
    /// The agent on the other side of the handoff
    pub counterpart: String,
    /// Caller-supplied handoff reference, e.g. a task or ticket id
    pub reference: String,
    pub timestamp: DateTime<Utc>,
}

/// Latest known state of one agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentState {
    pub name: String,
    pub first_seen: DateTime<Utc>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_metrics_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_inbound_handoff: Option<HandoffRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outbound_handoff: Option<HandoffRef>,
    pub updated_at: DateTime<Utc>,
}

impl AgentState {
    fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            first_seen: now,
            status: "unknown".to_string(),
            last_action: None,
            last_action_at: None,
            last_metrics: None,
            last_metrics_at: None,
            last_inbound_handoff: None,
            last_outbound_handoff: None,
            updated_at: now,
        }
    }
}

/// Partial update merged onto an [`AgentState`]; absent fields are untouched
#[derive(Debug, Clone, Default)]
pub struct AgentStatePatch {
    pub status: Option<String>,
    pub action: Option<String>,
    pub metrics: Option<Value>,
    pub inbound_handoff: Option<HandoffRef>,
    pub outbound_handoff: Option<HandoffRef>,
}

/// Last-writer-wins mapping of agent name to latest known state
#[derive(Debug, Default)]
pub struct AgentStateRegistry {
    states: RwLock<HashMap<String, AgentState>>,
}

impl AgentStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `patch` onto the record for `name`, creating it on first reference.
    /// Returns a snapshot of the resulting state.
    pub async fn update(&self, name: &str, patch: AgentStatePatch) -> AgentState {
        let now = Utc::now();
        let mut states = self.states.write().await;
        let state = states
            .entry(name.to_string())
            .or_insert_with(|| AgentState::new(name, now));

        if let Some(status) = patch.status {
            state.status = status;
        }
        if let Some(action) = patch.action {
            state.last_action = Some(action);
            state.last_action_at = Some(now);
        }
        if let Some(metrics) = patch.metrics {
            state.last_metrics = Some(metrics);
            state.last_metrics_at = Some(now);
        }
        if let Some(handoff) = patch.inbound_handoff {
            state.last_inbound_handoff = Some(handoff);
        }
        if let Some(handoff) = patch.outbound_handoff {
            state.last_outbound_handoff = Some(handoff);
        }
        state.updated_at = now;
        state.clone()
    }

    /// Snapshot of the current state for `name`, if any
    pub async fn get(&self, name: &str) -> Option<AgentState> {
        self.states.read().await.get(name).cloned()
    }

    /// Snapshot of all known agent states, sorted by name
    pub async fn all(&self) -> Vec<AgentState> {
        let mut states: Vec<AgentState> = self.states.read().await.values().cloned().collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    /// Number of agents the registry has seen
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}
