//! # Dead-letter queue for poison deliveries.
//!
//! When a delivery exhausts its retry budget, fails fatally, or is abandoned
//! at shutdown, the bus moves the event here together with its full failure
//! history. Entries are never auto-deleted; operator tooling consumes them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Event;

/// One failed delivery attempt, recorded by the bus worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Error message returned (or panic summary).
    pub error: String,
    /// When the attempt failed.
    pub at: DateTime<Utc>,
    /// When the next attempt was scheduled; `None` on the final attempt.
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// A delivery that will never be retried again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// The original event, unmodified.
    pub event: Event,
    /// The subscriber whose delivery failed.
    pub subscriber_id: String,
    /// Per-attempt failure history (empty for enqueue-time failures such as
    /// a full queue).
    pub attempts: Vec<DeliveryAttempt>,
    /// Final error that sealed the entry.
    pub final_error: String,
    /// When the entry was created.
    pub dead_lettered_at: DateTime<Utc>,
}

/// Append-only store of dead-lettered deliveries.
#[derive(Default)]
pub struct DeadLetterQueue {
    entries: RwLock<Vec<DeadLetterEntry>>,
}

impl DeadLetterQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: DeadLetterEntry) {
        self.entries.write().push(entry);
    }

    /// Number of dead-lettered deliveries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing was dead-lettered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.read().clone()
    }

    /// Entries for one original event id.
    pub fn for_event(&self, event_id: Uuid) -> Vec<DeadLetterEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.event.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Serializes all entries for operator tooling.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.entries.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Payload, SensorReading};

    #[test]
    fn export_carries_failure_history() {
        let dlq = DeadLetterQueue::new();
        let event = Event::workflow_start(Payload::SensorDataReceived(SensorReading::new(
            "S1", 250.0, "°C", 100.0,
        )));
        dlq.push(DeadLetterEntry {
            event,
            subscriber_id: "validation".to_string(),
            attempts: vec![DeliveryAttempt {
                attempt: 1,
                error: "transient failure: db timeout".to_string(),
                at: Utc::now(),
                next_retry_at: None,
            }],
            final_error: "transient failure: db timeout".to_string(),
            dead_lettered_at: Utc::now(),
        });

        let json = dlq.export_json().expect("serialize");
        assert!(json.contains("db timeout"));
        assert!(json.contains("validation"));
        assert_eq!(dlq.for_event(dlq.entries()[0].event.event_id).len(), 1);
    }
}
