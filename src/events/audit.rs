//! # Append-only audit log of published events.
//!
//! Every event handed to [`EventBus::publish`](super::EventBus::publish) is
//! appended here before any delivery is attempted, so the full causal chain
//! of a workflow stays reconstructable even when deliveries fail.
//!
//! Entries are never mutated or removed; retention is an external concern.

use parking_lot::RwLock;
use uuid::Uuid;

use super::event::Event;

/// Append-only, concurrently writable event record.
///
/// Reads return clones; the internal vector is never exposed.
#[derive(Default)]
pub struct AuditLog {
    entries: RwLock<Vec<Event>>,
}

impl AuditLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event.
    pub fn append(&self, event: &Event) {
        self.entries.write().push(event.clone());
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All events belonging to one workflow, in publish order.
    pub fn for_correlation(&self, correlation_id: Uuid) -> Vec<Event> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    /// Full snapshot in publish order.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Payload, SensorReading};

    #[test]
    fn filters_by_correlation() {
        let log = AuditLog::new();
        let a = Event::workflow_start(Payload::SensorDataReceived(SensorReading::new(
            "S1", 1.0, "°C", 10.0,
        )));
        let b = Event::workflow_start(Payload::SensorDataReceived(SensorReading::new(
            "S2", 2.0, "°C", 10.0,
        )));
        log.append(&a);
        log.append(&b);

        let chain = log.for_correlation(a.correlation_id);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].event_id, a.event_id);
        assert_eq!(log.len(), 2);
    }
}
