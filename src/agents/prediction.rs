//! # Prediction agent: time-to-failure estimate.
//!
//! Runs only after the orchestrator cleared the workflow (auto-approval or
//! human decision). Model internals are out of scope for the substrate, so
//! the estimate is a deterministic function of severity and validation
//! confidence; the alert is persisted before the event is returned.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::events::{Event, EventType, Payload, Prediction, Severity, Urgency};
use crate::interfaces::Persistence;
use crate::runtime::{Agent, IdempotencyGuard};

/// Estimates time-to-failure for approved anomalies.
pub struct PredictionAgent {
    store: Arc<dyn Persistence>,
    guard: IdempotencyGuard,
}

impl PredictionAgent {
    /// Creates the agent with its persistence collaborator.
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self {
            store,
            guard: IdempotencyGuard::new(),
        }
    }

    /// Baseline days-to-failure per severity band, stretched by how unsure
    /// validation was (low confidence → more runway assumed).
    fn estimate_days(severity: Severity, confidence: f64) -> f64 {
        let base = match severity {
            Severity::Critical => 3.0,
            Severity::High => 7.0,
            Severity::Moderate => 21.0,
            Severity::Low => 45.0,
        };
        base * (2.0 - confidence.clamp(0.0, 1.0))
    }
}

#[async_trait]
impl Agent for PredictionAgent {
    fn id(&self) -> &str {
        "prediction"
    }

    fn capabilities(&self) -> &[&'static str] {
        &["predict_failure"]
    }

    fn consumes(&self) -> &[EventType] {
        &[EventType::PredictionRequested]
    }

    fn emits(&self) -> &[EventType] {
        &[EventType::MaintenancePredicted]
    }

    async fn process(&self, event: &Event) -> Result<Vec<Event>, AgentError> {
        let Payload::PredictionRequested(request) = &event.payload else {
            return Err(AgentError::fatal("prediction received unexpected payload"));
        };
        // Redelivered clearance: the alert is already stored and announced.
        if self.guard.seen(event.event_id) {
            return Ok(Vec::new());
        }

        let validation = &request.validation;
        let anomaly = &validation.anomaly;
        let days_to_failure = Self::estimate_days(anomaly.severity, validation.confidence);
        let prediction = Prediction {
            sensor_id: anomaly.reading.sensor_id.clone(),
            severity: anomaly.severity,
            confidence: validation.confidence,
            days_to_failure,
            urgency: Urgency::from_days(days_to_failure),
        };

        self.store
            .save_alert(&prediction)
            .await
            .map_err(|e| AgentError::transient(format!("save_alert failed: {e}")))?;
        self.guard.mark(event.event_id);

        Ok(vec![Event::follow(
            event,
            Payload::MaintenancePredicted(prediction),
        )])
    }
}
