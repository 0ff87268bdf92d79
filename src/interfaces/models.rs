//! # Model registry / artifact store collaborator.
//!
//! Detection resolves its scoring model on demand: ask the registry for the
//! best match for a sensor type, then load the artifact. Both steps may be
//! slow or unavailable — callers wrap resolution in a timeout and fall back
//! to the statistical detector, never failing the event.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::events::SensorReading;

/// Reference to a model artifact, as recommended by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    /// Registry-unique model name.
    pub name: String,
    /// Artifact version tag.
    pub version: String,
    /// Sensor type the recommendation was made for.
    pub sensor_type: String,
}

/// Failure talking to the registry or loading an artifact.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ModelError {
    /// Registry/storage unreachable or timed out.
    #[error("model registry unavailable: {detail}")]
    Unavailable {
        /// Failure description.
        detail: String,
    },

    /// No model is registered for this sensor type.
    #[error("no model registered for sensor type {sensor_type}")]
    NotFound {
        /// The unmatched sensor type key.
        sensor_type: String,
    },
}

/// A loaded, ready-to-score model handle.
///
/// Scoring is synchronous and cheap; loading was the slow part.
pub trait AnomalyModel: Send + Sync + 'static {
    /// Model name for provenance reporting.
    fn name(&self) -> &str;

    /// Anomaly score for one reading, in `[0, 1]`.
    fn score(&self, reading: &SensorReading) -> f64;
}

/// Model recommendation + artifact loading seam.
#[async_trait]
pub trait ModelRegistry: Send + Sync + 'static {
    /// Best matching model for a sensor type.
    async fn recommend_model(&self, sensor_type: &str) -> Result<ModelRef, ModelError>;

    /// Loads the artifact behind a recommendation.
    async fn load_model(&self, model_ref: &ModelRef) -> Result<Arc<dyn AnomalyModel>, ModelError>;
}

/// In-memory registry mapping sensor types to pre-built models.
#[derive(Default)]
pub struct StaticModelRegistry {
    models: HashMap<String, Arc<dyn AnomalyModel>>,
}

impl StaticModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model for a sensor type (builder style).
    pub fn with_model(mut self, sensor_type: impl Into<String>, model: Arc<dyn AnomalyModel>) -> Self {
        self.models.insert(sensor_type.into(), model);
        self
    }
}

#[async_trait]
impl ModelRegistry for StaticModelRegistry {
    async fn recommend_model(&self, sensor_type: &str) -> Result<ModelRef, ModelError> {
        let model = self
            .models
            .get(sensor_type)
            .ok_or_else(|| ModelError::NotFound {
                sensor_type: sensor_type.to_string(),
            })?;
        Ok(ModelRef {
            name: model.name().to_string(),
            version: "static".to_string(),
            sensor_type: sensor_type.to_string(),
        })
    }

    async fn load_model(&self, model_ref: &ModelRef) -> Result<Arc<dyn AnomalyModel>, ModelError> {
        self.models
            .get(&model_ref.sensor_type)
            .cloned()
            .ok_or_else(|| ModelError::NotFound {
                sensor_type: model_ref.sensor_type.clone(),
            })
    }
}

/// Built-in model scoring by threshold-breach ratio.
///
/// Stands in for a real trained artifact in demos; the score saturates at
/// twice the threshold.
pub struct ThresholdRatioModel;

impl AnomalyModel for ThresholdRatioModel {
    fn name(&self) -> &str {
        "threshold-ratio"
    }

    fn score(&self, reading: &SensorReading) -> f64 {
        if reading.threshold <= 0.0 {
            return 0.0;
        }
        ((reading.value - reading.threshold) / reading.threshold).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_registry_recommends_and_loads() {
        let registry =
            StaticModelRegistry::new().with_model("temp", Arc::new(ThresholdRatioModel));
        let model_ref = registry.recommend_model("temp").await.expect("recommend");
        assert_eq!(model_ref.name, "threshold-ratio");

        let model = registry.load_model(&model_ref).await.expect("load");
        let score = model.score(&SensorReading::new("temp-1", 250.0, "°C", 100.0));
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unknown_sensor_type_is_not_found() {
        let registry = StaticModelRegistry::new();
        assert!(matches!(
            registry.recommend_model("vibration").await,
            Err(ModelError::NotFound { .. })
        ));
    }
}
