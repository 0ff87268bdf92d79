//! # Decision policy: auto-approve, escalate, or close.
//!
//! Consulted once per `AnomalyValidated` event. The policy weighs the
//! validation verdict, its confidence and equipment criticality; it never
//! looks at raw sensor data — that evidence is already condensed into the
//! verdict.

use crate::config::DecisionConfig;
use crate::events::{Validation, ValidationVerdict};

/// Outcome of a policy consultation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Continue the pipeline without a human.
    AutoApprove,
    /// Block on a human decision.
    Escalate {
        /// Why policy refused to auto-approve.
        reason: String,
    },
    /// End the workflow without maintenance.
    Close {
        /// Why the workflow ends here.
        reason: String,
    },
}

/// Confidence/criticality policy over validation outcomes.
pub struct DecisionPolicy {
    cfg: DecisionConfig,
}

impl DecisionPolicy {
    /// Creates a policy from its config.
    pub fn new(cfg: DecisionConfig) -> Self {
        Self { cfg }
    }

    /// Picks the path for one validated anomaly.
    ///
    /// Order matters: criticality overrides everything — a critical sensor
    /// never auto-approves, even on a suspected false positive.
    pub fn decide(&self, validation: &Validation) -> Decision {
        let sensor_id = &validation.anomaly.reading.sensor_id;
        if self.cfg.critical_sensors.iter().any(|s| s == sensor_id) {
            return Decision::Escalate {
                reason: format!("critical equipment: {sensor_id}"),
            };
        }

        match validation.verdict {
            ValidationVerdict::FalsePositiveSuspected => Decision::Close {
                reason: "false positive suspected".to_string(),
            },
            ValidationVerdict::FurtherInvestigationNeeded => {
                if self.cfg.escalate_investigation {
                    Decision::Escalate {
                        reason: "further investigation needed".to_string(),
                    }
                } else {
                    Decision::Close {
                        reason: "investigation not escalated by policy".to_string(),
                    }
                }
            }
            ValidationVerdict::CredibleAnomaly => {
                if validation.confidence >= self.cfg.auto_approve_confidence {
                    Decision::AutoApprove
                } else {
                    Decision::Escalate {
                        reason: format!(
                            "confidence {:.2} below auto-approve threshold {:.2}",
                            validation.confidence, self.cfg.auto_approve_confidence
                        ),
                    }
                }
            }
        }
    }
}
