//! # Per-workflow tracked state.
//!
//! One [`WorkflowState`] per `correlation_id`, owned exclusively by the
//! coordinator: current stage, the full transition trace, every decision
//! made (automated or human) and the SLA deadline.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::{DecisionActor, Validation};
use crate::orchestrator::stage::WorkflowStage;

/// One recorded stage entry.
#[derive(Debug, Clone)]
pub struct StageTransition {
    /// Stage entered.
    pub stage: WorkflowStage,
    /// When it was entered.
    pub at: DateTime<Utc>,
}

/// One recorded decision and its actor.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    /// Who decided.
    pub actor: DecisionActor,
    /// What was decided (stable snake_case label + detail).
    pub decision: String,
    /// When.
    pub at: DateTime<Utc>,
}

/// Tracked state of one workflow instance.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    /// The workflow's correlation id.
    pub correlation_id: Uuid,
    /// Current stage.
    pub stage: WorkflowStage,
    /// Every stage entered, in order.
    pub stage_trace: Vec<StageTransition>,
    /// Every decision made, in order.
    pub decision_history: Vec<DecisionRecord>,
    /// When the workflow opened.
    pub opened_at: DateTime<Utc>,
    /// SLA deadline; passing it in a non-terminal stage times the workflow
    /// out.
    pub deadline: DateTime<Utc>,
    /// Why a `Closed`/`TimedOut` workflow ended, if it did.
    pub close_reason: Option<String>,
    /// Validation held while a human decision is pending; consumed when the
    /// workflow resumes.
    pub pending_validation: Option<Validation>,
}

impl WorkflowState {
    /// Opens a workflow at `initial` with the given SLA.
    pub fn open(correlation_id: Uuid, initial: WorkflowStage, sla: std::time::Duration) -> Self {
        let now = Utc::now();
        Self {
            correlation_id,
            stage: initial,
            stage_trace: vec![StageTransition {
                stage: initial,
                at: now,
            }],
            decision_history: Vec::new(),
            opened_at: now,
            deadline: now
                + chrono::Duration::from_std(sla).unwrap_or_else(|_| chrono::Duration::seconds(90)),
            close_reason: None,
            pending_validation: None,
        }
    }

    /// Moves to `next` if it strictly progresses the workflow.
    ///
    /// Returns `false` (no-op) for terminal states and for stages at or
    /// below the current rank — the idempotent-resumption guard for
    /// at-least-once delivery.
    pub fn advance(&mut self, next: WorkflowStage) -> bool {
        if self.stage.is_terminal() || next.rank() <= self.stage.rank() {
            return false;
        }
        self.stage = next;
        self.stage_trace.push(StageTransition {
            stage: next,
            at: Utc::now(),
        });
        true
    }

    /// Appends a decision record.
    pub fn record_decision(&mut self, actor: DecisionActor, decision: impl Into<String>) {
        self.decision_history.push(DecisionRecord {
            actor,
            decision: decision.into(),
            at: Utc::now(),
        });
    }

    /// True once a human decision was recorded (guards duplicate responses).
    pub fn human_decided(&self) -> bool {
        self.decision_history
            .iter()
            .any(|d| matches!(d.actor, DecisionActor::Human(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn advance_is_monotone_and_terminal_stages_freeze() {
        let mut wf = WorkflowState::open(Uuid::new_v4(), WorkflowStage::Received, Duration::from_secs(90));
        assert!(wf.advance(WorkflowStage::Processed));
        // Redelivery of the same stage: no-op.
        assert!(!wf.advance(WorkflowStage::Processed));
        // Regression: no-op.
        assert!(!wf.advance(WorkflowStage::Received));

        assert!(wf.advance(WorkflowStage::TimedOut));
        assert!(!wf.advance(WorkflowStage::AnomalyDetected));
        assert_eq!(wf.stage, WorkflowStage::TimedOut);
        assert_eq!(wf.stage_trace.len(), 3);
    }

    #[test]
    fn human_decision_detection() {
        let mut wf = WorkflowState::open(Uuid::new_v4(), WorkflowStage::Received, Duration::from_secs(90));
        wf.record_decision(DecisionActor::Automated, "escalated");
        assert!(!wf.human_decided());
        wf.record_decision(DecisionActor::Human("op-1".into()), "approved");
        assert!(wf.human_decided());
    }
}
