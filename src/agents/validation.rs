//! # Validation agent: rules + historical context.
//!
//! Cross-checks every detected anomaly before it can trigger maintenance:
//!
//! ```text
//! AnomalyDetected
//!   ├─► rule pass          external RuleEngine, or BuiltinRules fallback
//!   ├─► history pass       last N readings (circuit-broken store access)
//!   │     ├─ recurrence    similar past breaches ≥ threshold → quirk
//!   │     └─ stability     jump from a stable baseline → confidence up
//!   └─► weighted confidence vs two thresholds → verdict
//! ```
//!
//! ## Degradation ladder
//! - External rule engine fails → built-in rules, `RuleEngineUnavailable`.
//! - Store fails → breaker counts it; verdict degrades to a conservative
//!   `FurtherInvestigationNeeded` with `InsufficientData` — the anomaly is
//!   never silently dropped.
//! - Breaker open → history pass skipped entirely (no timeout stacking);
//!   same conservative outcome until the cooldown probe succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ValidationConfig;
use crate::error::AgentError;
use crate::events::{
    Anomaly, Event, EventType, Payload, SensorReading, Validation, ValidationFlag,
    ValidationVerdict,
};
use crate::interfaces::{BuiltinRules, Persistence, RuleEngine};
use crate::policies::CircuitBreaker;
use crate::runtime::Agent;

/// Validates detected anomalies against rules and history.
pub struct ValidationAgent {
    cfg: ValidationConfig,
    store: Arc<dyn Persistence>,
    rules: Option<Arc<dyn RuleEngine>>,
    builtin: BuiltinRules,
    breaker: CircuitBreaker,
}

impl ValidationAgent {
    /// Creates the agent. Pass `None` for `rules` to use the built-in set
    /// directly.
    pub fn new(
        cfg: ValidationConfig,
        store: Arc<dyn Persistence>,
        rules: Option<Arc<dyn RuleEngine>>,
    ) -> Self {
        let breaker = CircuitBreaker::new(cfg.store_failure_threshold, cfg.store_cooldown);
        Self {
            cfg,
            store,
            rules,
            builtin: BuiltinRules::new(),
            breaker,
        }
    }

    /// Rule pass with built-in fallback.
    async fn rule_score(&self, anomaly: &Anomaly, flags: &mut Vec<ValidationFlag>) -> f64 {
        match &self.rules {
            Some(engine) => match engine.evaluate(anomaly).await {
                Ok(score) => score.score.clamp(0.0, 1.0),
                Err(e) => {
                    warn!(error = %e, "rule engine failed; using built-in rules");
                    flags.push(ValidationFlag::RuleEngineUnavailable);
                    self.builtin.score(anomaly).score
                }
            },
            None => self.builtin.score(anomaly).score,
        }
    }

    /// History pass behind the store circuit breaker.
    ///
    /// Returns `None` when history is unavailable (outage or open breaker).
    async fn fetch_history(&self, sensor_id: &str) -> Option<Vec<SensorReading>> {
        if !self.breaker.allow() {
            return None;
        }
        match self
            .store
            .query_recent_readings(sensor_id, self.cfg.history_window)
            .await
        {
            Ok(history) => {
                self.breaker.record_success();
                Some(history)
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!(sensor = sensor_id, error = %e, "history lookup failed");
                None
            }
        }
    }

    /// Historical-context component in `[0, 1]`; 0.5 is neutral.
    fn history_component(
        &self,
        anomaly: &Anomaly,
        history: &[SensorReading],
        flags: &mut Vec<ValidationFlag>,
    ) -> f64 {
        let value = anomaly.reading.value;
        let mut component: f64 = 0.5;

        // Recurrence: similar past breaches suggest a sensor quirk. The
        // ratio is taken over the configured window, so sparse history
        // cannot inflate it.
        let similar_breaches = history
            .iter()
            .filter(|r| r.threshold > 0.0 && r.value > r.threshold)
            .filter(|r| {
                let scale = value.abs().max(1e-9);
                (r.value - value).abs() / scale <= self.cfg.similarity_tolerance
            })
            .count();
        let recurrence = similar_breaches as f64 / self.cfg.history_window as f64;
        if recurrence >= self.cfg.recurrence_threshold {
            flags.push(ValidationFlag::RecurringPattern);
            component -= 0.35;
        }

        // Stability: a jump from a stable recent baseline raises confidence
        // that something actually changed.
        if history.len() >= 2 {
            let mean = history.iter().map(|r| r.value).sum::<f64>() / history.len() as f64;
            let var = history
                .iter()
                .map(|r| (r.value - mean) * (r.value - mean))
                .sum::<f64>()
                / (history.len() - 1) as f64;
            let std = var.sqrt();
            let rel_std = std / mean.abs().max(1e-9);
            let jump = (value - mean).abs() > (3.0 * std).max(0.1 * mean.abs());
            if rel_std <= self.cfg.stability_tolerance && jump {
                flags.push(ValidationFlag::StableBaselineJump);
                component += 0.25;
            }
        }

        component.clamp(0.0, 1.0)
    }
}

#[async_trait]
impl Agent for ValidationAgent {
    fn id(&self) -> &str {
        "validation"
    }

    fn capabilities(&self) -> &[&'static str] {
        &["validate_anomalies"]
    }

    fn consumes(&self) -> &[EventType] {
        &[EventType::AnomalyDetected]
    }

    fn emits(&self) -> &[EventType] {
        &[EventType::AnomalyValidated]
    }

    async fn process(&self, event: &Event) -> Result<Vec<Event>, AgentError> {
        let Payload::AnomalyDetected(anomaly) = &event.payload else {
            return Err(AgentError::fatal("validation received unexpected payload"));
        };

        let mut flags = Vec::new();
        let rule = self.rule_score(anomaly, &mut flags).await;

        let (mut confidence, mut verdict) =
            match self.fetch_history(&anomaly.reading.sensor_id).await {
                None => {
                    // No history evidence at all: rule-only confidence, and
                    // a conservative verdict regardless of it.
                    flags.push(ValidationFlag::InsufficientData);
                    (rule, ValidationVerdict::FurtherInvestigationNeeded)
                }
                Some(history) => {
                    // The just-persisted current reading is not historical
                    // evidence about itself.
                    let history: Vec<SensorReading> = history
                        .into_iter()
                        .filter(|r| r.recorded_at != anomaly.reading.recorded_at)
                        .collect();

                    let confidence = if history.is_empty() {
                        rule
                    } else {
                        let hist = self.history_component(anomaly, &history, &mut flags);
                        let weight_sum = self.cfg.rule_weight + self.cfg.history_weight;
                        (self.cfg.rule_weight * rule + self.cfg.history_weight * hist) / weight_sum
                    };

                    let verdict = if flags.contains(&ValidationFlag::RecurringPattern) {
                        ValidationVerdict::FalsePositiveSuspected
                    } else if confidence >= self.cfg.credible_threshold {
                        ValidationVerdict::CredibleAnomaly
                    } else if confidence < self.cfg.false_positive_threshold {
                        ValidationVerdict::FalsePositiveSuspected
                    } else {
                        ValidationVerdict::FurtherInvestigationNeeded
                    };
                    (confidence, verdict)
                }
            };

        // A recurring pattern caps confidence below the credible band.
        if flags.contains(&ValidationFlag::RecurringPattern) {
            confidence = confidence.min(self.cfg.false_positive_threshold);
        }
        if !confidence.is_finite() {
            flags.push(ValidationFlag::ValidationError);
            confidence = 0.5;
            verdict = ValidationVerdict::FurtherInvestigationNeeded;
        }

        Ok(vec![Event::follow(
            event,
            Payload::AnomalyValidated(Validation {
                anomaly: anomaly.clone(),
                verdict,
                confidence,
                flags,
            }),
        )])
    }
}
