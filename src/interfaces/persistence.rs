//! # Persistence collaborator.
//!
//! Readings, alerts and decisions are persisted through this seam. Failures
//! are connectivity-shaped ([`StoreError::Unavailable`]) and treated as
//! transient by agents — the bus retries, validation trips its breaker.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::events::{DecisionActor, Prediction, SensorReading};

/// Connectivity failure talking to the store.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("store unavailable: {detail}")]
    Unavailable {
        /// Driver-level failure description.
        detail: String,
    },
}

/// Narrow persistence interface consumed by the agents.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    /// Durably stores one sensor reading.
    async fn save_reading(&self, reading: &SensorReading) -> Result<(), StoreError>;

    /// Durably stores a maintenance alert (prediction outcome).
    async fn save_alert(&self, prediction: &Prediction) -> Result<(), StoreError>;

    /// Durably stores a workflow decision for audit.
    async fn save_decision(
        &self,
        correlation_id: Uuid,
        actor: &DecisionActor,
        decision: &str,
    ) -> Result<(), StoreError>;

    /// Returns up to `limit` most recent readings for a sensor, oldest
    /// first.
    async fn query_recent_readings(
        &self,
        sensor_id: &str,
        limit: usize,
    ) -> Result<Vec<SensorReading>, StoreError>;
}

/// Recorded decision row kept by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct DecisionRow {
    pub correlation_id: Uuid,
    pub actor: DecisionActor,
    pub decision: String,
}

const PER_SENSOR_CAP: usize = 256;

/// In-memory [`Persistence`] used by demos and tests.
///
/// Keeps a bounded ring of readings per sensor plus flat alert/decision
/// lists. All methods complete immediately and never fail.
#[derive(Default)]
pub struct MemoryStore {
    readings: Mutex<HashMap<String, VecDeque<SensorReading>>>,
    alerts: Mutex<Vec<Prediction>>,
    decisions: Mutex<Vec<DecisionRow>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds history for a sensor (test/demo setup), oldest first.
    pub fn seed_readings(&self, sensor_id: &str, readings: impl IntoIterator<Item = SensorReading>) {
        let mut map = self.readings.lock();
        let ring = map.entry(sensor_id.to_string()).or_default();
        for r in readings {
            if ring.len() == PER_SENSOR_CAP {
                ring.pop_front();
            }
            ring.push_back(r);
        }
    }

    /// Stored alerts, oldest first.
    pub fn alerts(&self) -> Vec<Prediction> {
        self.alerts.lock().clone()
    }

    /// Stored decisions, oldest first.
    pub fn decisions(&self) -> Vec<DecisionRow> {
        self.decisions.lock().clone()
    }

    /// Number of stored readings for one sensor.
    pub fn reading_count(&self, sensor_id: &str) -> usize {
        self.readings
            .lock()
            .get(sensor_id)
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn save_reading(&self, reading: &SensorReading) -> Result<(), StoreError> {
        let mut map = self.readings.lock();
        let ring = map.entry(reading.sensor_id.clone()).or_default();
        if ring.len() == PER_SENSOR_CAP {
            ring.pop_front();
        }
        ring.push_back(reading.clone());
        Ok(())
    }

    async fn save_alert(&self, prediction: &Prediction) -> Result<(), StoreError> {
        self.alerts.lock().push(prediction.clone());
        Ok(())
    }

    async fn save_decision(
        &self,
        correlation_id: Uuid,
        actor: &DecisionActor,
        decision: &str,
    ) -> Result<(), StoreError> {
        self.decisions.lock().push(DecisionRow {
            correlation_id,
            actor: actor.clone(),
            decision: decision.to_string(),
        });
        Ok(())
    }

    async fn query_recent_readings(
        &self,
        sensor_id: &str,
        limit: usize,
    ) -> Result<Vec<SensorReading>, StoreError> {
        let map = self.readings.lock();
        Ok(map
            .get(sensor_id)
            .map(|ring| {
                let skip = ring.len().saturating_sub(limit);
                ring.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recent_readings_are_bounded_and_ordered() {
        let store = MemoryStore::new();
        for i in 0..30 {
            store
                .save_reading(&SensorReading::new("S1", i as f64, "°C", 100.0))
                .await
                .expect("save");
        }
        let recent = store
            .query_recent_readings("S1", 5)
            .await
            .expect("query");
        let values: Vec<f64> = recent.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![25.0, 26.0, 27.0, 28.0, 29.0]);
        assert!(store
            .query_recent_readings("unknown", 5)
            .await
            .expect("query")
            .is_empty());
    }
}
