//! # Typed runtime configuration.
//!
//! Provides [`CoreConfig`] — centralized settings for the bus, the agents
//! and the orchestrator — plus the per-area structs it is composed of.
//!
//! Configuration is plain named fields with documented defaults, validated
//! once at construction via [`CoreConfig::validated`]; no runtime attribute
//! injection, no sentinel magic beyond what each field documents.
//!
//! ## Usage
//! ```rust
//! use upkeep::config::CoreConfig;
//!
//! let mut cfg = CoreConfig::default();
//! cfg.validation.credible_threshold = 0.75;
//! let cfg = cfg.validated().expect("sane config");
//! ```

use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, RetryPolicy};

/// Event-bus delivery settings.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Ring-buffer capacity of the observability tap (min 1; clamped).
    ///
    /// Slow `watch()` observers that lag further than this skip events;
    /// agent delivery queues are unaffected.
    pub tap_capacity: usize,
    /// Attempt budget per (event, subscriber) delivery.
    pub retry: RetryPolicy,
    /// Delay schedule between delivery attempts.
    pub backoff: BackoffPolicy,
}

impl Default for BusConfig {
    /// `tap_capacity = 1024`, 4 attempts, exponential backoff 100ms → 10s.
    fn default() -> Self {
        Self {
            tap_capacity: 1024,
            retry: RetryPolicy::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Acquisition-stage settings.
#[derive(Clone, Debug)]
pub struct AcquisitionConfig {
    /// How many recent persisted readings feed the rolling-mean enrichment.
    pub context_window: usize,
}

impl Default for AcquisitionConfig {
    /// `context_window = 20`.
    fn default() -> Self {
        Self { context_window: 20 }
    }
}

/// Anomaly-detection settings.
#[derive(Clone, Debug)]
pub struct DetectionConfig {
    /// Combined score in `(0, 1]` above which a reading is anomalous.
    pub anomaly_threshold: f64,
    /// How long a loaded model stays cached before re-resolution.
    pub model_ttl: Duration,
    /// Budget for one model resolution (recommendation + artifact load);
    /// on expiry the statistical fallback scores the event.
    pub load_timeout: Duration,
    /// Concurrent model loads allowed (bounded worker pool).
    pub loader_pool: usize,
    /// Rolling-statistics window per sensor for the z-score fallback.
    pub stats_window: usize,
    /// Minimum samples before the z-score component contributes.
    pub min_samples: usize,
    /// Weight of the model score in the combined decision (rest goes to the
    /// statistical component).
    pub model_weight: f64,
}

impl Default for DetectionConfig {
    /// Threshold 0.6, model TTL 60min, load timeout 2s, pool of 4,
    /// 64-sample window, 5 minimum samples, model weight 0.7.
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.6,
            model_ttl: Duration::from_secs(60 * 60),
            load_timeout: Duration::from_secs(2),
            loader_pool: 4,
            stats_window: 64,
            min_samples: 5,
            model_weight: 0.7,
        }
    }
}

/// Anomaly-validation settings.
#[derive(Clone, Debug)]
pub struct ValidationConfig {
    /// Historical readings consulted per validation.
    pub history_window: usize,
    /// Fraction of similar historical anomalies at or above which the
    /// anomaly is treated as a recurring sensor quirk.
    pub recurrence_threshold: f64,
    /// Relative value tolerance for "similar" historical readings.
    pub similarity_tolerance: f64,
    /// Confidence at or above which the verdict is `CredibleAnomaly`.
    pub credible_threshold: f64,
    /// Confidence below which the verdict is `FalsePositiveSuspected`.
    pub false_positive_threshold: f64,
    /// Weight of the rule-engine score in the final confidence.
    pub rule_weight: f64,
    /// Weight of the historical-context component in the final confidence.
    pub history_weight: f64,
    /// Relative standard deviation under which a baseline counts as stable.
    pub stability_tolerance: f64,
    /// Store failures that open the history circuit breaker.
    pub store_failure_threshold: u32,
    /// How long the history breaker stays open.
    pub store_cooldown: Duration,
}

impl Default for ValidationConfig {
    /// Window 20, recurrence 0.25, similarity 5%, credible 0.7 /
    /// false-positive 0.4, rule weight 0.6 / history weight 0.4,
    /// stability 10%, breaker 3 failures / 30s cooldown.
    fn default() -> Self {
        Self {
            history_window: 20,
            recurrence_threshold: 0.25,
            similarity_tolerance: 0.05,
            credible_threshold: 0.7,
            false_positive_threshold: 0.4,
            rule_weight: 0.6,
            history_weight: 0.4,
            stability_tolerance: 0.1,
            store_failure_threshold: 3,
            store_cooldown: Duration::from_secs(30),
        }
    }
}

/// Orchestrator decision-policy settings.
#[derive(Clone, Debug)]
pub struct DecisionConfig {
    /// Validation confidence at or above which a credible anomaly continues
    /// without a human.
    pub auto_approve_confidence: f64,
    /// Sensors on critical equipment; their workflows always escalate.
    pub critical_sensors: Vec<String>,
    /// Whether `FurtherInvestigationNeeded` verdicts escalate (otherwise
    /// they close the workflow).
    pub escalate_investigation: bool,
}

impl Default for DecisionConfig {
    /// Auto-approve at 0.8, no critical sensors, escalate investigations.
    fn default() -> Self {
        Self {
            auto_approve_confidence: 0.8,
            critical_sensors: Vec::new(),
            escalate_investigation: true,
        }
    }
}

/// Notification-stage settings.
#[derive(Clone, Debug)]
pub struct NotificationConfig {
    /// Consecutive send failures that open one channel's breaker.
    pub channel_failure_threshold: u32,
    /// How long a tripped channel stays open.
    pub channel_cooldown: Duration,
    /// Budget for one channel send.
    pub send_timeout: Duration,
}

impl Default for NotificationConfig {
    /// 3 failures, 60s cooldown, 5s send timeout.
    fn default() -> Self {
        Self {
            channel_failure_threshold: 3,
            channel_cooldown: Duration::from_secs(60),
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Global configuration for the coordination runtime.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Bus delivery settings.
    pub bus: BusConfig,
    /// Acquisition settings.
    pub acquisition: AcquisitionConfig,
    /// Detection settings.
    pub detection: DetectionConfig,
    /// Validation settings.
    pub validation: ValidationConfig,
    /// Orchestrator decision policy.
    pub decision: DecisionConfig,
    /// Notification settings.
    pub notification: NotificationConfig,
    /// End-to-end deadline per workflow (escalations included).
    pub workflow_sla: Duration,
    /// Budget for one agent's `start()`.
    pub startup_timeout: Duration,
    /// Grace period for draining in-flight work at `stop()`/shutdown.
    pub grace: Duration,
}

impl Default for CoreConfig {
    /// Defaults: 90s workflow SLA, 5s startup timeout, 10s shutdown grace,
    /// nested defaults per area.
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            acquisition: AcquisitionConfig::default(),
            detection: DetectionConfig::default(),
            validation: ValidationConfig::default(),
            decision: DecisionConfig::default(),
            notification: NotificationConfig::default(),
            workflow_sla: Duration::from_secs(90),
            startup_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(10),
        }
    }
}

impl CoreConfig {
    /// Validates cross-field invariants and returns the config unchanged.
    ///
    /// Rejects inverted validation thresholds, out-of-range scores/weights
    /// and zero windows — the failure modes that would otherwise surface as
    /// silently wrong verdicts deep in a workflow.
    pub fn validated(self) -> Result<Self, ConfigError> {
        fn unit_range(field: &'static str, v: f64) -> Result<(), ConfigError> {
            if !(v > 0.0 && v <= 1.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    detail: format!("{v} is outside (0, 1]"),
                });
            }
            Ok(())
        }

        unit_range("detection.anomaly_threshold", self.detection.anomaly_threshold)?;
        unit_range("detection.model_weight", self.detection.model_weight)?;
        unit_range("validation.credible_threshold", self.validation.credible_threshold)?;
        unit_range(
            "validation.false_positive_threshold",
            self.validation.false_positive_threshold,
        )?;
        unit_range("validation.recurrence_threshold", self.validation.recurrence_threshold)?;
        unit_range("decision.auto_approve_confidence", self.decision.auto_approve_confidence)?;

        if self.validation.credible_threshold <= self.validation.false_positive_threshold {
            return Err(ConfigError::InvalidValue {
                field: "validation.credible_threshold",
                detail: format!(
                    "must exceed false_positive_threshold ({} <= {})",
                    self.validation.credible_threshold, self.validation.false_positive_threshold
                ),
            });
        }
        let weight_sum = self.validation.rule_weight + self.validation.history_weight;
        if weight_sum <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "validation.rule_weight",
                detail: "rule_weight + history_weight must be positive".into(),
            });
        }
        if self.validation.history_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "validation.history_window",
                detail: "must be at least 1".into(),
            });
        }
        if self.detection.loader_pool == 0 {
            return Err(ConfigError::InvalidValue {
                field: "detection.loader_pool",
                detail: "must be at least 1".into(),
            });
        }
        if self.workflow_sla.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "workflow_sla",
                detail: "must be positive".into(),
            });
        }
        Ok(self)
    }
}

impl CoreConfig {
    /// Returns defaults tuned for tests/demos: same semantics, short waits.
    pub fn demo() -> Self {
        let mut cfg = Self::default();
        cfg.bus.backoff.first = Duration::from_millis(10);
        cfg.bus.backoff.max = Duration::from_millis(200);
        cfg.detection.load_timeout = Duration::from_millis(200);
        cfg.workflow_sla = Duration::from_secs(90);
        cfg
    }
}
