//! Notifications for external subscribers
//!
//! Accepted entries and flush cycles are published over a broadcast channel
//! so real-time consumers (a dashboard, a test harness) can observe the
//! engine without ever blocking it. Delivery is at-least-once for receivers
//! that keep up; a lagging receiver observes `RecvError::Lagged` instead of
//! stalling the producer.

use crate::entry::LogEntry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event published to telemetry subscribers
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// One accepted log entry
    Entry(Arc<LogEntry>),
    /// One flush cycle, emitted even when nothing was pending
    Flush {
        count: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Fan-out hub for [`TelemetryEvent`]s
#[derive(Debug)]
pub struct NotificationHub {
    tx: broadcast::Sender<TelemetryEvent>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; a send with no subscribers is not an error
    pub fn emit(&self, event: TelemetryEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let hub = NotificationHub::new(8);
        hub.emit(TelemetryEvent::Flush {
            count: 0,
            timestamp: Utc::now(),
        });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_flush_event() {
        let hub = NotificationHub::new(8);
        let mut rx = hub.subscribe();

        hub.emit(TelemetryEvent::Flush {
            count: 3,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            TelemetryEvent::Flush { count, .. } => assert_eq!(count, 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
