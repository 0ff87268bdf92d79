//! # Rule-engine collaborator.
//!
//! Validation runs a rule pass over every detected anomaly. A deployment
//! may plug an external engine; when it is absent or failing, the built-in
//! threshold/range rules keep validation functional.

use async_trait::async_trait;
use thiserror::Error;

use crate::events::Anomaly;

/// Outcome of a rule pass.
#[derive(Debug, Clone)]
pub struct RuleScore {
    /// Rule confidence that the anomaly is a real fault, in `[0, 1]`.
    pub score: f64,
    /// Names of the rules that fired.
    pub matched: Vec<String>,
}

/// Failure evaluating rules.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuleError {
    /// The engine could not be reached or rejected the evaluation.
    #[error("rule engine unavailable: {detail}")]
    Unavailable {
        /// Failure description.
        detail: String,
    },
}

/// Pluggable rule evaluation seam.
#[async_trait]
pub trait RuleEngine: Send + Sync + 'static {
    /// Scores one anomaly against the configured rules.
    async fn evaluate(&self, anomaly: &Anomaly) -> Result<RuleScore, RuleError>;
}

/// Minimal built-in rule set: threshold breach + gross range check.
///
/// Used directly when no external engine is configured and as the fallback
/// when the external engine fails.
#[derive(Default)]
pub struct BuiltinRules;

impl BuiltinRules {
    /// Creates the built-in rule set.
    pub fn new() -> Self {
        Self
    }

    /// Synchronous evaluation; infallible.
    pub fn score(&self, anomaly: &Anomaly) -> RuleScore {
        let reading = &anomaly.reading;
        let mut matched = Vec::new();

        // Gross range rule: wildly out-of-band values are faults regardless
        // of the nominal threshold.
        if !reading.value.is_finite() || reading.value.abs() >= 1e9 {
            matched.push("gross_range".to_string());
            return RuleScore {
                score: 1.0,
                matched,
            };
        }

        let score = if reading.threshold > 0.0 {
            let ratio = (reading.value - reading.threshold) / reading.threshold;
            if ratio > 0.0 {
                matched.push("threshold_breach".to_string());
                (0.5 + ratio / 2.0).min(1.0)
            } else {
                matched.push("within_threshold".to_string());
                (0.5 + ratio).clamp(0.05, 0.5)
            }
        } else {
            // No usable threshold: defer to the detector's own score.
            matched.push("no_threshold".to_string());
            anomaly.score.clamp(0.0, 1.0)
        };

        RuleScore { score, matched }
    }
}

#[async_trait]
impl RuleEngine for BuiltinRules {
    async fn evaluate(&self, anomaly: &Anomaly) -> Result<RuleScore, RuleError> {
        Ok(self.score(anomaly))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DetectorKind, SensorReading, Severity};

    fn anomaly(value: f64, threshold: f64) -> Anomaly {
        Anomaly {
            reading: SensorReading::new("S1", value, "°C", threshold),
            score: 0.8,
            severity: Severity::High,
            detector: DetectorKind::Statistical,
        }
    }

    #[test]
    fn breach_scores_above_half_and_saturates() {
        let strong = BuiltinRules.score(&anomaly(250.0, 100.0));
        assert!((strong.score - 1.0).abs() < f64::EPSILON);
        assert!(strong.matched.contains(&"threshold_breach".to_string()));

        let mild = BuiltinRules.score(&anomaly(110.0, 100.0));
        assert!(mild.score > 0.5 && mild.score < 0.6);
    }

    #[test]
    fn within_threshold_scores_low() {
        let s = BuiltinRules.score(&anomaly(50.0, 100.0));
        assert!(s.score <= 0.5);
    }

    #[test]
    fn gross_range_maxes_out() {
        let s = BuiltinRules.score(&anomaly(1e12, 100.0));
        assert!((s.score - 1.0).abs() < f64::EPSILON);
        assert!(s.matched.contains(&"gross_range".to_string()));
    }
}
