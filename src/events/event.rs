//! # Event envelope: identity, correlation, causation.
//!
//! Every state transition in the pipeline is announced by an [`Event`]:
//! an immutable envelope around a typed [`Payload`].
//!
//! ## Chain invariants
//! - `correlation_id` is minted once per workflow
//!   ([`Event::workflow_start`]) and never regenerated downstream.
//! - `causation_id` of every derived event ([`Event::follow`]) equals the
//!   `event_id` of its immediate predecessor, forming an auditable chain.
//!
//! ```text
//! workflow_start(reading)          follow(e1, processed)     follow(e2, anomaly)
//!   e1 { corr=C, cause=None } ──►  e2 { corr=C, cause=e1 } ──► e3 { corr=C, cause=e2 }
//! ```
//!
//! There is no mutation API: once constructed, an event is only cloned and
//! shipped. The audit log retains every published event; retention/GC is an
//! external concern.
//!
//! ## Example
//! ```rust
//! use upkeep::events::{Event, EventType, Payload, SensorReading};
//!
//! let reading = SensorReading::new("S1", 250.0, "°C", 100.0);
//! let first = Event::workflow_start(Payload::SensorDataReceived(reading));
//! assert_eq!(first.event_type, EventType::SensorDataReceived);
//! assert!(first.causation_id.is_none());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::{
    Anomaly, DeadLetterNotice, EscalationRequest, HumanDecision, MaintenanceLog, Prediction,
    PredictionRequest, ProcessedReading, Schedule, SensorReading, Validation,
};

/// Current event schema version, stamped into every envelope.
pub const SCHEMA_VERSION: u16 = 1;

/// Discriminator for every event flowing through the bus.
///
/// Pipeline order: `SensorDataReceived → DataProcessed → AnomalyDetected →
/// AnomalyValidated → PredictionRequested → MaintenancePredicted →
/// MaintenanceScheduled → MaintenanceLogged`, with the human-gate pair
/// (`HumanDecisionRequired` / `HumanDecisionResponse`) branching off
/// validation and `EventDeadLettered` as the bus's own observability hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Raw sensor reading entered the system.
    SensorDataReceived,
    /// Reading validated and enriched by acquisition.
    DataProcessed,
    /// Combined detector decision crossed the anomaly threshold.
    AnomalyDetected,
    /// Validation verdict (credible / false-positive / investigate).
    AnomalyValidated,
    /// Orchestrator cleared the workflow for prediction.
    PredictionRequested,
    /// Time-to-failure estimate produced.
    MaintenancePredicted,
    /// Maintenance task booked into a window.
    MaintenanceScheduled,
    /// Notifications dispatched; closes the workflow loop.
    MaintenanceLogged,
    /// Orchestrator escalated to a human operator.
    HumanDecisionRequired,
    /// Operator responded to an escalation.
    HumanDecisionResponse,
    /// A delivery exhausted retries and was dead-lettered (never retried).
    EventDeadLettered,
}

impl EventType {
    /// Short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventType::SensorDataReceived => "sensor_data_received",
            EventType::DataProcessed => "data_processed",
            EventType::AnomalyDetected => "anomaly_detected",
            EventType::AnomalyValidated => "anomaly_validated",
            EventType::PredictionRequested => "prediction_requested",
            EventType::MaintenancePredicted => "maintenance_predicted",
            EventType::MaintenanceScheduled => "maintenance_scheduled",
            EventType::MaintenanceLogged => "maintenance_logged",
            EventType::HumanDecisionRequired => "human_decision_required",
            EventType::HumanDecisionResponse => "human_decision_response",
            EventType::EventDeadLettered => "event_dead_lettered",
        }
    }
}

/// Typed per-stage event data.
///
/// Each variant carries the full context the next stage needs, so agents
/// stay stateless between events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    SensorDataReceived(SensorReading),
    DataProcessed(ProcessedReading),
    AnomalyDetected(Anomaly),
    AnomalyValidated(Validation),
    PredictionRequested(PredictionRequest),
    MaintenancePredicted(Prediction),
    MaintenanceScheduled(Schedule),
    MaintenanceLogged(MaintenanceLog),
    HumanDecisionRequired(EscalationRequest),
    HumanDecisionResponse(HumanDecision),
    EventDeadLettered(DeadLetterNotice),
}

impl Payload {
    /// The discriminator matching this payload variant.
    pub fn event_type(&self) -> EventType {
        match self {
            Payload::SensorDataReceived(_) => EventType::SensorDataReceived,
            Payload::DataProcessed(_) => EventType::DataProcessed,
            Payload::AnomalyDetected(_) => EventType::AnomalyDetected,
            Payload::AnomalyValidated(_) => EventType::AnomalyValidated,
            Payload::PredictionRequested(_) => EventType::PredictionRequested,
            Payload::MaintenancePredicted(_) => EventType::MaintenancePredicted,
            Payload::MaintenanceScheduled(_) => EventType::MaintenanceScheduled,
            Payload::MaintenanceLogged(_) => EventType::MaintenanceLogged,
            Payload::HumanDecisionRequired(_) => EventType::HumanDecisionRequired,
            Payload::HumanDecisionResponse(_) => EventType::HumanDecisionResponse,
            Payload::EventDeadLettered(_) => EventType::EventDeadLettered,
        }
    }
}

/// Immutable event envelope.
///
/// - `event_id`: unique per event
/// - `correlation_id`: shared by every event of one workflow instance
/// - `causation_id`: `event_id` of the direct predecessor (`None` only for
///   workflow-opening events)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique id of this event.
    pub event_id: Uuid,
    /// Discriminator, always consistent with `payload`.
    pub event_type: EventType,
    /// Workflow-instance id, invariant across the whole chain.
    pub correlation_id: Uuid,
    /// Id of the event that directly triggered this one.
    pub causation_id: Option<Uuid>,
    /// Wall-clock creation timestamp.
    pub at: DateTime<Utc>,
    /// Envelope schema version.
    pub schema_version: u16,
    /// Typed per-stage data.
    pub payload: Payload,
}

impl Event {
    /// Opens a new workflow: mints a fresh `correlation_id`, no causation.
    pub fn workflow_start(payload: Payload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: payload.event_type(),
            correlation_id: Uuid::new_v4(),
            causation_id: None,
            at: Utc::now(),
            schema_version: SCHEMA_VERSION,
            payload,
        }
    }

    /// Derives the next event in a chain: copies the predecessor's
    /// `correlation_id` and records its `event_id` as causation.
    pub fn follow(cause: &Event, payload: Payload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: payload.event_type(),
            correlation_id: cause.correlation_id,
            causation_id: Some(cause.event_id),
            at: Utc::now(),
            schema_version: SCHEMA_VERSION,
            payload,
        }
    }

    /// True if this event directly follows `other` in the same workflow.
    pub fn follows(&self, other: &Event) -> bool {
        self.correlation_id == other.correlation_id && self.causation_id == Some(other.event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> SensorReading {
        SensorReading::new("S1", 42.0, "°C", 100.0)
    }

    #[test]
    fn workflow_start_has_no_causation() {
        let e = Event::workflow_start(Payload::SensorDataReceived(reading()));
        assert!(e.causation_id.is_none());
        assert_eq!(e.schema_version, SCHEMA_VERSION);
        assert_eq!(e.event_type, EventType::SensorDataReceived);
    }

    #[test]
    fn follow_propagates_correlation_and_sets_causation() {
        let first = Event::workflow_start(Payload::SensorDataReceived(reading()));
        let second = Event::follow(
            &first,
            Payload::DataProcessed(ProcessedReading {
                reading: reading(),
                rolling_mean: None,
                sample_count: 0,
            }),
        );
        assert!(second.follows(&first));
        assert_ne!(second.event_id, first.event_id);
    }

    #[test]
    fn payload_serde_round_trips_with_type_tag() {
        let e = Event::workflow_start(Payload::SensorDataReceived(reading()));
        let json = serde_json::to_string(&e).expect("serialize");
        assert!(json.contains("\"type\":\"SensorDataReceived\""));
        let back: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.event_id, e.event_id);
        assert_eq!(back.event_type, EventType::SensorDataReceived);
    }
}
