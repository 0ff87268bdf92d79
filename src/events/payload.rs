//! Per-stage payload types carried inside [`Payload`](super::Payload).
//!
//! Plain serde records; constructors exist only where a field needs a
//! default worth centralizing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::EventType;

/// One raw sensor measurement as it entered the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    /// Stable sensor identifier, e.g. `"temp-press-04"`.
    pub sensor_id: String,
    /// Measured value in `unit`.
    pub value: f64,
    /// Unit of measure, informational.
    pub unit: String,
    /// Nominal operating threshold for this sensor.
    pub threshold: f64,
    /// When the measurement was taken.
    pub recorded_at: DateTime<Utc>,
}

impl SensorReading {
    /// Creates a reading stamped with the current time.
    pub fn new(
        sensor_id: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        threshold: f64,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            value,
            unit: unit.into(),
            threshold,
            recorded_at: Utc::now(),
        }
    }
}

/// Reading after acquisition validated and enriched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedReading {
    /// The validated reading.
    pub reading: SensorReading,
    /// Mean over the sensor's recent persisted window, if any history exists.
    pub rolling_mean: Option<f64>,
    /// How many historical samples backed `rolling_mean`.
    pub sample_count: usize,
}

/// Anomaly severity band derived from the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Maps a combined score in `[0, 1]` to a band.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Severity::Critical
        } else if score >= 0.75 {
            Severity::High
        } else if score >= 0.5 {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }
}

/// Which detector produced the anomaly score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorKind {
    /// Score from a model resolved through the model registry.
    Model {
        /// Model reference name as reported by the registry.
        name: String,
    },
    /// Score from the local statistical fallback (z-score).
    Statistical,
}

/// A reading the detection stage flagged as anomalous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// The reading that scored anomalous.
    pub reading: SensorReading,
    /// Combined decision score in `[0, 1]`.
    pub score: f64,
    /// Severity band for `score`.
    pub severity: Severity,
    /// Provenance of the score.
    pub detector: DetectorKind,
}

/// Validation verdict over a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationVerdict {
    /// Cross-checks agree: this is a real anomaly.
    CredibleAnomaly,
    /// Recurrence/context suggests a sensor quirk, not a fault.
    FalsePositiveSuspected,
    /// Evidence inconclusive; a human or later data must decide.
    FurtherInvestigationNeeded,
}

/// Qualifiers attached to a validation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationFlag {
    /// Historical context was unavailable (store outage / breaker open).
    InsufficientData,
    /// External rule engine failed; built-in rules were used.
    RuleEngineUnavailable,
    /// Similar anomalies recurred above the configured fraction.
    RecurringPattern,
    /// Value jumped from a stable recent baseline.
    StableBaselineJump,
    /// Validation itself failed part-way; verdict is conservative.
    ValidationError,
}

/// Outcome of the validation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    /// The anomaly under validation.
    pub anomaly: Anomaly,
    /// Verdict picked from the two-threshold comparison.
    pub verdict: ValidationVerdict,
    /// Weighted confidence in `[0, 1]` that the anomaly is real.
    pub confidence: f64,
    /// Qualifiers explaining how the verdict was reached.
    pub flags: Vec<ValidationFlag>,
}

/// Who made a workflow decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionActor {
    /// The orchestrator's policy decided without escalation.
    Automated,
    /// A named human operator decided.
    Human(String),
}

/// Orchestrator clearance for the prediction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// The validation that was approved.
    pub validation: Validation,
    /// Who approved continuing the pipeline.
    pub approved_by: DecisionActor,
}

/// How soon the predicted failure demands action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    /// Act within hours.
    Immediate,
    /// Act within days.
    Urgent,
    /// Schedule within the month.
    Planned,
    /// Next routine service is fine.
    Routine,
}

impl Urgency {
    /// Bands a time-to-failure estimate (days) into an urgency.
    pub fn from_days(days: f64) -> Self {
        if days <= 3.0 {
            Urgency::Immediate
        } else if days <= 7.0 {
            Urgency::Urgent
        } else if days <= 30.0 {
            Urgency::Planned
        } else {
            Urgency::Routine
        }
    }
}

/// Time-to-failure estimate for an approved anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Sensor the prediction applies to.
    pub sensor_id: String,
    /// Severity carried over from detection.
    pub severity: Severity,
    /// Validation confidence carried into the estimate.
    pub confidence: f64,
    /// Estimated days until failure.
    pub days_to_failure: f64,
    /// Urgency band for `days_to_failure`.
    pub urgency: Urgency,
}

/// A booked maintenance task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique id of the booked task.
    pub task_id: Uuid,
    /// Sensor/equipment the task targets.
    pub sensor_id: String,
    /// Urgency that drove the window choice.
    pub urgency: Urgency,
    /// Window start.
    pub window_start: DateTime<Utc>,
    /// Window end.
    pub window_end: DateTime<Utc>,
}

/// Result of one notification channel attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Channel name (e.g. `"console"`, `"webhook"`).
    pub channel: String,
    /// Whether the channel accepted the message.
    pub delivered: bool,
    /// Receipt id or failure detail.
    pub detail: String,
}

/// Closing record of a workflow: what was booked and who was told.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceLog {
    /// The booked task this log closes out.
    pub task_id: Uuid,
    /// Sensor/equipment the task targets.
    pub sensor_id: String,
    /// Per-channel delivery outcomes.
    pub deliveries: Vec<DeliveryRecord>,
}

/// Escalation handed to a human operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRequest {
    /// The validation that needs a human call.
    pub validation: Validation,
    /// Why policy refused to auto-approve.
    pub reason: String,
}

/// Operator response to an escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanDecision {
    /// Whether the pipeline may continue.
    pub approved: bool,
    /// Operator identifier.
    pub actor: String,
    /// Optional free-text note.
    pub note: Option<String>,
}

/// Summary published when a delivery is dead-lettered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterNotice {
    /// Id of the event whose delivery failed.
    pub original_event_id: Uuid,
    /// Type of the failed event.
    pub original_type: EventType,
    /// Subscriber whose delivery exhausted retries.
    pub subscriber_id: String,
    /// Number of attempts recorded before dead-lettering.
    pub attempts: u32,
    /// Final error message.
    pub last_error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_score(0.95), Severity::Critical);
        assert_eq!(Severity::from_score(0.8), Severity::High);
        assert_eq!(Severity::from_score(0.6), Severity::Moderate);
        assert_eq!(Severity::from_score(0.1), Severity::Low);
    }

    #[test]
    fn urgency_bands() {
        assert_eq!(Urgency::from_days(1.0), Urgency::Immediate);
        assert_eq!(Urgency::from_days(5.0), Urgency::Urgent);
        assert_eq!(Urgency::from_days(20.0), Urgency::Planned);
        assert_eq!(Urgency::from_days(90.0), Urgency::Routine);
    }
}
