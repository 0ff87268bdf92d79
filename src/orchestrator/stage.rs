//! # Explicit workflow stage machine.
//!
//! ```text
//! Received → Processed → AnomalyDetected → Validated ─┬─► AutoApproved ──┐
//!                                                     └─► EscalatedToHuman ─┘
//!                                                                │
//!            Predicted → Scheduled → Notified → Logged ◄─────────┘
//!
//! TimedOut  ◄── any non-terminal stage, once the workflow deadline passes
//! Closed    ◄── policy branches (false positive, human rejection)
//! ```
//!
//! Stage progression is monotone: an event that maps to a stage at or below
//! the current one is an idempotent no-op (at-least-once redelivery), and
//! terminal stages never transition again.

use serde::{Deserialize, Serialize};

/// Stage of one workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStage {
    /// Sensor reading arrived.
    Received,
    /// Acquisition validated/enriched the reading.
    Processed,
    /// Detection flagged an anomaly.
    AnomalyDetected,
    /// Validation produced a verdict.
    Validated,
    /// Policy auto-approved continuing the pipeline.
    AutoApproved,
    /// Waiting on a human decision.
    EscalatedToHuman,
    /// Time-to-failure estimate produced.
    Predicted,
    /// Maintenance task booked.
    Scheduled,
    /// Notification fan-out completed.
    Notified,
    /// Closing log written — terminal.
    Logged,
    /// Deadline passed before completion — terminal.
    TimedOut,
    /// Policy ended the workflow without maintenance — terminal.
    Closed,
}

impl WorkflowStage {
    /// Monotone progression rank; approval branches share a rank.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            WorkflowStage::Received => 0,
            WorkflowStage::Processed => 1,
            WorkflowStage::AnomalyDetected => 2,
            WorkflowStage::Validated => 3,
            WorkflowStage::AutoApproved | WorkflowStage::EscalatedToHuman => 4,
            WorkflowStage::Predicted => 5,
            WorkflowStage::Scheduled => 6,
            WorkflowStage::Notified => 7,
            WorkflowStage::Logged => 8,
            WorkflowStage::TimedOut | WorkflowStage::Closed => u8::MAX,
        }
    }

    /// True for stages that never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStage::Logged | WorkflowStage::TimedOut | WorkflowStage::Closed
        )
    }

    /// Short stable label (snake_case) for logs/queries.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkflowStage::Received => "received",
            WorkflowStage::Processed => "processed",
            WorkflowStage::AnomalyDetected => "anomaly_detected",
            WorkflowStage::Validated => "validated",
            WorkflowStage::AutoApproved => "auto_approved",
            WorkflowStage::EscalatedToHuman => "escalated_to_human",
            WorkflowStage::Predicted => "predicted",
            WorkflowStage::Scheduled => "scheduled",
            WorkflowStage::Notified => "notified",
            WorkflowStage::Logged => "logged",
            WorkflowStage::TimedOut => "timed_out",
            WorkflowStage::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_monotone_along_the_golden_path() {
        let path = [
            WorkflowStage::Received,
            WorkflowStage::Processed,
            WorkflowStage::AnomalyDetected,
            WorkflowStage::Validated,
            WorkflowStage::AutoApproved,
            WorkflowStage::Predicted,
            WorkflowStage::Scheduled,
            WorkflowStage::Notified,
            WorkflowStage::Logged,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn terminal_stages() {
        assert!(WorkflowStage::Logged.is_terminal());
        assert!(WorkflowStage::TimedOut.is_terminal());
        assert!(WorkflowStage::Closed.is_terminal());
        assert!(!WorkflowStage::EscalatedToHuman.is_terminal());
    }
}
