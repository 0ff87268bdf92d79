//! # Acquisition agent: validate, enrich, persist.
//!
//! First stage of the pipeline. A malformed reading is poison (fatal, never
//! retried); a store outage is transient (the bus retries). The reading is
//! persisted *before* the `DataProcessed` event is returned, so downstream
//! stages never see a reading that was not durably stored.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AcquisitionConfig;
use crate::error::AgentError;
use crate::events::{Event, EventType, Payload, ProcessedReading, SensorReading};
use crate::interfaces::Persistence;
use crate::runtime::Agent;

/// Validates and enriches inbound sensor readings.
pub struct AcquisitionAgent {
    cfg: AcquisitionConfig,
    store: Arc<dyn Persistence>,
}

impl AcquisitionAgent {
    /// Creates the agent with its persistence collaborator.
    pub fn new(cfg: AcquisitionConfig, store: Arc<dyn Persistence>) -> Self {
        Self { cfg, store }
    }

    fn validate(reading: &SensorReading) -> Result<(), AgentError> {
        if reading.sensor_id.trim().is_empty() {
            return Err(AgentError::fatal("reading has empty sensor_id"));
        }
        if !reading.value.is_finite() {
            return Err(AgentError::fatal(format!(
                "reading value is not finite: {}",
                reading.value
            )));
        }
        if !reading.threshold.is_finite() {
            return Err(AgentError::fatal(format!(
                "reading threshold is not finite: {}",
                reading.threshold
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Agent for AcquisitionAgent {
    fn id(&self) -> &str {
        "acquisition"
    }

    fn capabilities(&self) -> &[&'static str] {
        &["acquire_sensor_data"]
    }

    fn consumes(&self) -> &[EventType] {
        &[EventType::SensorDataReceived]
    }

    fn emits(&self) -> &[EventType] {
        &[EventType::DataProcessed]
    }

    async fn process(&self, event: &Event) -> Result<Vec<Event>, AgentError> {
        let Payload::SensorDataReceived(reading) = &event.payload else {
            return Err(AgentError::fatal("acquisition received unexpected payload"));
        };
        Self::validate(reading)?;

        // Enrichment is best-effort: a failed history query degrades to an
        // un-enriched event rather than blocking ingestion.
        let history = self
            .store
            .query_recent_readings(&reading.sensor_id, self.cfg.context_window)
            .await
            .unwrap_or_default();
        let rolling_mean = if history.is_empty() {
            None
        } else {
            Some(history.iter().map(|r| r.value).sum::<f64>() / history.len() as f64)
        };

        self.store
            .save_reading(reading)
            .await
            .map_err(|e| AgentError::transient(format!("save_reading failed: {e}")))?;

        Ok(vec![Event::follow(
            event,
            Payload::DataProcessed(ProcessedReading {
                reading: reading.clone(),
                rolling_mean,
                sample_count: history.len(),
            }),
        )])
    }
}
