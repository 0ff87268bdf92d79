//! # Anomaly detection agent: cached model + statistical fallback.
//!
//! Scores every processed reading with the best available detector and
//! emits `AnomalyDetected` only when the combined score crosses the
//! configured threshold — silence is the "normal" signal.
//!
//! ## Model resolution
//! ```text
//! process(DataProcessed)
//!   ├─► sensor type key (id prefix) ─► TTL cache hit? ──► score with model
//!   │                                       │ miss/expired
//!   │                                       ▼
//!   │                    bounded loader pool (semaphore) + load timeout
//!   │                        ├─ recommend_model() ─► load_model()
//!   │                        │        ok → cache, mark recovered
//!   │                        └─ slow/unavailable → statistical fallback,
//!   │                                              mark degraded
//!   └─► combined score ≥ threshold? ──► AnomalyDetected : (silence)
//! ```
//!
//! Detection never fails an event over infrastructure: a dead model
//! registry only degrades the score source. The per-sensor rolling window
//! feeds a z-score detector that works with no model at all.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::error::AgentError;
use crate::events::{Anomaly, DetectorKind, Event, EventType, Payload, SensorReading, Severity};
use crate::interfaces::{AnomalyModel, ModelRegistry};
use crate::runtime::{Agent, HealthCell};

/// One cached model resolution.
struct CachedModel {
    model: Arc<dyn AnomalyModel>,
    loaded_at: Instant,
}

/// Per-sensor rolling statistics for the z-score fallback.
struct RollingStats {
    window: VecDeque<f64>,
    cap: usize,
}

impl RollingStats {
    fn new(cap: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    fn push(&mut self, value: f64) {
        if self.window.len() == self.cap {
            self.window.pop_front();
        }
        self.window.push_back(value);
    }

    fn len(&self) -> usize {
        self.window.len()
    }

    fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    fn std(&self) -> f64 {
        let n = self.window.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .window
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / (n - 1) as f64;
        var.sqrt()
    }
}

/// Scores processed readings; degrades gracefully to statistics.
pub struct DetectionAgent {
    cfg: DetectionConfig,
    models: Arc<dyn ModelRegistry>,
    cache: tokio::sync::Mutex<HashMap<String, CachedModel>>,
    pool: Arc<Semaphore>,
    stats: Mutex<HashMap<String, RollingStats>>,
    health: Arc<HealthCell>,
}

impl DetectionAgent {
    /// Creates the agent with its model-registry collaborator.
    pub fn new(cfg: DetectionConfig, models: Arc<dyn ModelRegistry>) -> Arc<Self> {
        let pool = Arc::new(Semaphore::new(cfg.loader_pool.max(1)));
        Arc::new(Self {
            cfg,
            models,
            cache: tokio::sync::Mutex::new(HashMap::new()),
            pool,
            stats: Mutex::new(HashMap::new()),
            health: Arc::new(HealthCell::new()),
        })
    }

    /// The health cell this agent flips between Running and Degraded; share
    /// it with the handle via `AgentHandle::with_health`.
    pub fn health_cell(self: &Arc<Self>) -> Arc<HealthCell> {
        Arc::clone(&self.health)
    }

    /// Sensor type key: the id prefix before the first `-`.
    fn sensor_type(sensor_id: &str) -> &str {
        sensor_id.split('-').next().unwrap_or(sensor_id)
    }

    /// Resolves a model through the TTL cache and bounded loader pool.
    ///
    /// Returns `None` on any failure or once the load timeout expires; the
    /// caller falls back to statistics for this event.
    async fn resolve_model(&self, sensor_type: &str) -> Option<Arc<dyn AnomalyModel>> {
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(sensor_type) {
                if cached.loaded_at.elapsed() < self.cfg.model_ttl {
                    return Some(Arc::clone(&cached.model));
                }
            }
        }

        let load = async {
            let _permit = self.pool.acquire().await.ok()?;
            let model_ref = self.models.recommend_model(sensor_type).await.ok()?;
            self.models.load_model(&model_ref).await.ok()
        };
        match tokio::time::timeout(self.cfg.load_timeout, load).await {
            Ok(Some(model)) => {
                self.cache.lock().await.insert(
                    sensor_type.to_string(),
                    CachedModel {
                        model: Arc::clone(&model),
                        loaded_at: Instant::now(),
                    },
                );
                self.health.mark_recovered();
                Some(model)
            }
            Ok(None) => {
                warn!(sensor_type, "model resolution failed; using statistical fallback");
                self.health.mark_degraded();
                None
            }
            Err(_elapsed) => {
                warn!(sensor_type, "model load timed out; using statistical fallback");
                self.health.mark_degraded();
                None
            }
        }
    }

    /// Statistical score: threshold-breach ratio combined with a z-score
    /// against the sensor's rolling window. Also records the value.
    fn statistical_score(&self, reading: &SensorReading) -> f64 {
        let breach = if reading.threshold > 0.0 {
            ((reading.value - reading.threshold) / reading.threshold).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut stats = self.stats.lock();
        let entry = stats
            .entry(reading.sensor_id.clone())
            .or_insert_with(|| RollingStats::new(self.cfg.stats_window));

        let z_component = if entry.len() >= self.cfg.min_samples {
            let std = entry.std().max(1e-9);
            let z = (reading.value - entry.mean()).abs() / std;
            (z / (z + 3.0)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        entry.push(reading.value);

        breach.max(z_component)
    }
}

#[async_trait]
impl Agent for DetectionAgent {
    fn id(&self) -> &str {
        "anomaly-detection"
    }

    fn capabilities(&self) -> &[&'static str] {
        &["detect_anomalies", "score_readings"]
    }

    fn consumes(&self) -> &[EventType] {
        &[EventType::DataProcessed]
    }

    fn emits(&self) -> &[EventType] {
        &[EventType::AnomalyDetected]
    }

    async fn process(&self, event: &Event) -> Result<Vec<Event>, AgentError> {
        let Payload::DataProcessed(processed) = &event.payload else {
            return Err(AgentError::fatal("detection received unexpected payload"));
        };
        let reading = &processed.reading;

        let statistical = self.statistical_score(reading);
        let (score, detector) = match self
            .resolve_model(Self::sensor_type(&reading.sensor_id))
            .await
        {
            Some(model) => {
                let model_score = model.score(reading).clamp(0.0, 1.0);
                let combined = self.cfg.model_weight * model_score
                    + (1.0 - self.cfg.model_weight) * statistical;
                (
                    combined,
                    DetectorKind::Model {
                        name: model.name().to_string(),
                    },
                )
            }
            None => (statistical, DetectorKind::Statistical),
        };

        if score < self.cfg.anomaly_threshold {
            debug!(
                sensor = %reading.sensor_id,
                score,
                "reading scored normal"
            );
            return Ok(Vec::new());
        }

        Ok(vec![Event::follow(
            event,
            Payload::AnomalyDetected(Anomaly {
                reading: reading.clone(),
                score,
                severity: Severity::from_score(score),
                detector,
            }),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{ModelError, ModelRef, StaticModelRegistry, ThresholdRatioModel};
    use crate::runtime::AgentStatus;

    fn processed(value: f64) -> Event {
        let reading = SensorReading::new("temp-04", value, "°C", 100.0);
        let start = Event::workflow_start(Payload::SensorDataReceived(reading.clone()));
        Event::follow(
            &start,
            Payload::DataProcessed(crate::events::ProcessedReading {
                reading,
                rolling_mean: None,
                sample_count: 0,
            }),
        )
    }

    fn fast_cfg() -> DetectionConfig {
        let mut cfg = DetectionConfig::default();
        cfg.load_timeout = std::time::Duration::from_millis(100);
        cfg
    }

    /// Registry that fails on every call.
    struct DeadRegistry;

    #[async_trait]
    impl ModelRegistry for DeadRegistry {
        async fn recommend_model(&self, _sensor_type: &str) -> Result<ModelRef, ModelError> {
            Err(ModelError::Unavailable {
                detail: "registry down".to_string(),
            })
        }
        async fn load_model(
            &self,
            _model_ref: &ModelRef,
        ) -> Result<Arc<dyn AnomalyModel>, ModelError> {
            Err(ModelError::Unavailable {
                detail: "registry down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn loader_failure_degrades_to_statistical_and_never_errors() {
        let agent = DetectionAgent::new(fast_cfg(), Arc::new(DeadRegistry));
        agent.health_cell().set_status(AgentStatus::Running);

        let out = agent.process(&processed(250.0)).await.expect("no error");
        assert_eq!(out.len(), 1);
        let Payload::AnomalyDetected(anomaly) = &out[0].payload else {
            panic!("expected anomaly");
        };
        assert_eq!(anomaly.detector, DetectorKind::Statistical);
        assert_eq!(anomaly.severity, Severity::Critical);
        assert_eq!(agent.health_cell().status(), AgentStatus::Degraded);
    }

    #[tokio::test]
    async fn model_score_is_used_when_registry_is_healthy() {
        let models = Arc::new(
            StaticModelRegistry::new().with_model("temp", Arc::new(ThresholdRatioModel)),
        );
        let agent = DetectionAgent::new(fast_cfg(), models);
        agent.health_cell().set_status(AgentStatus::Running);

        let out = agent.process(&processed(250.0)).await.expect("no error");
        let Payload::AnomalyDetected(anomaly) = &out[0].payload else {
            panic!("expected anomaly");
        };
        assert!(matches!(anomaly.detector, DetectorKind::Model { ref name } if name == "threshold-ratio"));
        assert_eq!(agent.health_cell().status(), AgentStatus::Running);
    }

    #[tokio::test]
    async fn normal_reading_is_silent() {
        let agent = DetectionAgent::new(fast_cfg(), Arc::new(DeadRegistry));
        let out = agent.process(&processed(42.0)).await.expect("no error");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn z_score_catches_a_jump_below_the_threshold() {
        let agent = DetectionAgent::new(fast_cfg(), Arc::new(DeadRegistry));

        // Stable baseline around 50 (all below the 100 threshold).
        for i in 0..10 {
            let out = agent
                .process(&processed(50.0 + (i % 2) as f64 * 0.5))
                .await
                .expect("no error");
            assert!(out.is_empty());
        }
        // 90 still does not breach the threshold, but the jump from a
        // stable baseline is a strong statistical anomaly.
        let out = agent.process(&processed(90.0)).await.expect("no error");
        assert_eq!(out.len(), 1);
        let Payload::AnomalyDetected(anomaly) = &out[0].payload else {
            panic!("expected anomaly");
        };
        assert!(anomaly.score >= 0.6);
    }

    #[tokio::test]
    async fn model_cache_avoids_repeated_resolution() {
        let models = Arc::new(
            StaticModelRegistry::new().with_model("temp", Arc::new(ThresholdRatioModel)),
        );
        let agent = DetectionAgent::new(fast_cfg(), models);

        agent.process(&processed(250.0)).await.expect("first");
        assert_eq!(agent.cache.lock().await.len(), 1);
        agent.process(&processed(250.0)).await.expect("second");
        assert_eq!(agent.cache.lock().await.len(), 1);
    }
}
