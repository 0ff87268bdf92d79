//! # Coordinator: the event-driven decision hub.
//!
//! Subscribes to every pipeline event, maintains one [`WorkflowState`] per
//! `correlation_id`, and gates the prediction stage: nothing runs past
//! validation until policy auto-approves or a human does.
//!
//! ## Wiring
//! ```text
//!  Bus ──► Coordinator::deliver(&event)
//!            ├─ SensorDataReceived   → open workflow, arm deadline watcher
//!            ├─ DataProcessed        → advance(Processed)
//!            ├─ AnomalyDetected      → advance(AnomalyDetected)
//!            ├─ AnomalyValidated     → advance(Validated) + policy:
//!            │     ├─ AutoApprove    → publish PredictionRequested
//!            │     ├─ Escalate       → publish HumanDecisionRequired, park
//!            │     └─ Close          → terminal Closed (policy branch)
//!            ├─ HumanDecisionResponse→ resume (approve) or Closed (reject)
//!            ├─ MaintenancePredicted → advance(Predicted)
//!            ├─ MaintenanceScheduled → advance(Scheduled)
//!            └─ MaintenanceLogged    → Notified → Logged (terminal)
//!
//!  deadline watcher (one task per workflow):
//!    sleep_until(deadline) → still non-terminal? → TimedOut (terminal)
//! ```
//!
//! ## Rules
//! - Transitions are event-driven only; the coordinator never polls.
//! - Stage re-entry for a correlation id is a no-op (at-least-once bus), so
//!   a redelivered `AnomalyValidated` cannot double-fire the gate.
//! - Late events for a terminal workflow are accepted and ignored; nothing
//!   reopens.
//! - Decisions are persisted best-effort through the optional store; the
//!   in-memory decision history is authoritative for queries.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AgentError, BusError};
use crate::events::{
    BusSubscriber, DecisionActor, EscalationRequest, Event, EventBus, EventType, HumanDecision,
    Payload, PredictionRequest, Validation,
};
use crate::interfaces::Persistence;
use crate::orchestrator::policy::{Decision, DecisionPolicy};
use crate::orchestrator::stage::WorkflowStage;
use crate::orchestrator::state::WorkflowState;

/// Bus subscriber id of the coordinator.
pub const ORCHESTRATOR_ID: &str = "orchestrator";

const HISTORY_CAP: usize = 1024;

const CONSUMES: &[EventType] = &[
    EventType::SensorDataReceived,
    EventType::DataProcessed,
    EventType::AnomalyDetected,
    EventType::AnomalyValidated,
    EventType::MaintenancePredicted,
    EventType::MaintenanceScheduled,
    EventType::MaintenanceLogged,
    EventType::HumanDecisionResponse,
];

const EMITS: &[EventType] = &[
    EventType::PredictionRequested,
    EventType::HumanDecisionRequired,
];

/// Stateful decision coordinator; one per pipeline.
pub struct Coordinator {
    bus: EventBus,
    policy: DecisionPolicy,
    sla: Duration,
    store: Option<Arc<dyn Persistence>>,
    active: Mutex<HashMap<Uuid, WorkflowState>>,
    history: Mutex<VecDeque<WorkflowState>>,
    token: CancellationToken,
    weak_self: Weak<Coordinator>,
}

impl Coordinator {
    /// Creates a coordinator bound to a bus.
    ///
    /// `store` persists decision records when present; absence only loses
    /// the external audit copy, never workflow progress.
    pub fn new(
        bus: EventBus,
        policy: DecisionPolicy,
        sla: Duration,
        store: Option<Arc<dyn Persistence>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            bus,
            policy,
            sla,
            store,
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            token: CancellationToken::new(),
            weak_self: weak.clone(),
        })
    }

    /// Subscribes the coordinator to the bus.
    pub fn attach(self: &Arc<Self>) -> Result<(), BusError> {
        self.bus.subscribe(Arc::clone(self) as Arc<dyn BusSubscriber>)
    }

    /// Cancels all deadline watchers. The pipeline unsubscribes separately.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// State of one workflow, active or already terminal.
    pub fn workflow_state(&self, correlation_id: Uuid) -> Option<WorkflowState> {
        if let Some(wf) = self.active.lock().get(&correlation_id) {
            return Some(wf.clone());
        }
        self.history
            .lock()
            .iter()
            .rev()
            .find(|wf| wf.correlation_id == correlation_id)
            .cloned()
    }

    /// All in-flight workflows.
    pub fn active(&self) -> Vec<WorkflowState> {
        self.active.lock().values().cloned().collect()
    }

    /// Terminal workflows, oldest first (bounded).
    pub fn history(&self) -> Vec<WorkflowState> {
        self.history.lock().iter().cloned().collect()
    }

    async fn on_event(&self, event: &Event) {
        match &event.payload {
            Payload::SensorDataReceived(_) => {
                self.open_or_advance(event, WorkflowStage::Received);
            }
            Payload::DataProcessed(_) => {
                self.open_or_advance(event, WorkflowStage::Processed);
            }
            Payload::AnomalyDetected(_) => {
                self.open_or_advance(event, WorkflowStage::AnomalyDetected);
            }
            Payload::AnomalyValidated(validation) => {
                self.handle_validated(event, validation).await;
            }
            Payload::MaintenancePredicted(_) => {
                self.open_or_advance(event, WorkflowStage::Predicted);
            }
            Payload::MaintenanceScheduled(_) => {
                self.open_or_advance(event, WorkflowStage::Scheduled);
            }
            Payload::MaintenanceLogged(_) => {
                self.handle_logged(event);
            }
            Payload::HumanDecisionResponse(decision) => {
                self.handle_response(event, decision).await;
            }
            _ => {}
        }
    }

    /// Ensures a workflow exists and advances it; arms the deadline watcher
    /// for newly opened workflows.
    fn open_or_advance(&self, event: &Event, stage: WorkflowStage) {
        let correlation_id = event.correlation_id;
        let opened = {
            let mut active = self.active.lock();
            match active.get_mut(&correlation_id) {
                Some(wf) => {
                    if !wf.advance(stage) {
                        debug!(
                            correlation = %correlation_id,
                            stage = stage.as_label(),
                            "stage re-entry ignored"
                        );
                    }
                    false
                }
                None => {
                    if self.seen_terminal(correlation_id) {
                        // Late event after timeout/closure: accepted, ignored.
                        return;
                    }
                    active.insert(
                        correlation_id,
                        WorkflowState::open(correlation_id, stage, self.sla),
                    );
                    true
                }
            }
        };
        if opened {
            self.arm_deadline(correlation_id);
        }
    }

    async fn handle_validated(&self, event: &Event, validation: &Validation) {
        let correlation_id = event.correlation_id;
        self.open_or_advance(event, WorkflowStage::Validated);

        let decision = {
            let mut active = self.active.lock();
            let Some(wf) = active.get_mut(&correlation_id) else {
                return;
            };
            // Re-entry guard: once a decision moved the workflow past
            // Validated, a redelivered validation event must not re-fire.
            if wf.stage != WorkflowStage::Validated {
                return;
            }
            let decision = self.policy.decide(validation);
            match &decision {
                Decision::AutoApprove => {
                    wf.record_decision(DecisionActor::Automated, "auto_approved");
                    wf.advance(WorkflowStage::AutoApproved);
                }
                Decision::Escalate { reason } => {
                    wf.record_decision(DecisionActor::Automated, format!("escalated: {reason}"));
                    wf.advance(WorkflowStage::EscalatedToHuman);
                    wf.pending_validation = Some(validation.clone());
                }
                Decision::Close { reason } => {
                    wf.record_decision(DecisionActor::Automated, format!("closed: {reason}"));
                    wf.advance(WorkflowStage::Closed);
                    wf.close_reason = Some(reason.clone());
                }
            }
            decision
        };

        self.persist_decision(correlation_id, &DecisionActor::Automated, &decision)
            .await;

        match decision {
            Decision::AutoApprove => {
                self.bus.publish(Event::follow(
                    event,
                    Payload::PredictionRequested(PredictionRequest {
                        validation: validation.clone(),
                        approved_by: DecisionActor::Automated,
                    }),
                ));
            }
            Decision::Escalate { reason } => {
                self.bus.publish(Event::follow(
                    event,
                    Payload::HumanDecisionRequired(EscalationRequest {
                        validation: validation.clone(),
                        reason,
                    }),
                ));
            }
            Decision::Close { .. } => {
                self.finalize(correlation_id);
            }
        }
    }

    async fn handle_response(&self, event: &Event, decision: &HumanDecision) {
        let correlation_id = event.correlation_id;
        let actor = DecisionActor::Human(decision.actor.clone());

        let resume = {
            let mut active = self.active.lock();
            let Some(wf) = active.get_mut(&correlation_id) else {
                // Unknown or already terminal (e.g. timed out): late
                // responses are no-ops, the workflow does not reopen.
                debug!(correlation = %correlation_id, "response for inactive workflow ignored");
                return;
            };
            if wf.stage != WorkflowStage::EscalatedToHuman || wf.human_decided() {
                return;
            }
            wf.record_decision(
                actor.clone(),
                if decision.approved {
                    "approved"
                } else {
                    "rejected"
                },
            );
            if decision.approved {
                wf.pending_validation.take()
            } else {
                wf.advance(WorkflowStage::Closed);
                wf.close_reason = Some(format!("rejected by {}", decision.actor));
                None
            }
        };

        self.persist_human_decision(correlation_id, &actor, decision.approved)
            .await;

        match resume {
            Some(validation) => {
                self.bus.publish(Event::follow(
                    event,
                    Payload::PredictionRequested(PredictionRequest {
                        validation,
                        approved_by: actor,
                    }),
                ));
            }
            None => {
                if !decision.approved {
                    self.finalize(correlation_id);
                } else {
                    // Approved but no parked validation: wiring bug worth
                    // surfacing, workflow stays escalated until timeout.
                    warn!(correlation = %correlation_id, "approved response without parked validation");
                }
            }
        }
    }

    fn handle_logged(&self, event: &Event) {
        let correlation_id = event.correlation_id;
        {
            let mut active = self.active.lock();
            let Some(wf) = active.get_mut(&correlation_id) else {
                return;
            };
            wf.advance(WorkflowStage::Notified);
            wf.advance(WorkflowStage::Logged);
        }
        self.finalize(correlation_id);
    }

    /// Moves a terminal workflow from the active map to bounded history.
    fn finalize(&self, correlation_id: Uuid) {
        let wf = {
            let mut active = self.active.lock();
            match active.get(&correlation_id) {
                Some(wf) if wf.stage.is_terminal() => active.remove(&correlation_id),
                _ => None,
            }
        };
        if let Some(wf) = wf {
            debug!(
                correlation = %correlation_id,
                stage = wf.stage.as_label(),
                "workflow finalized"
            );
            let mut history = self.history.lock();
            history.push_back(wf);
            if history.len() > HISTORY_CAP {
                history.pop_front();
            }
        }
    }

    fn seen_terminal(&self, correlation_id: Uuid) -> bool {
        self.history
            .lock()
            .iter()
            .any(|wf| wf.correlation_id == correlation_id)
    }

    /// One watcher task per workflow: fires at the deadline, times the
    /// workflow out if it is still non-terminal. The global token cancels
    /// all watchers at `stop()`.
    fn arm_deadline(&self, correlation_id: Uuid) {
        let weak = self.weak_self.clone();
        let token = self.token.clone();
        let sla = self.sla;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(sla) => {
                    if let Some(coordinator) = weak.upgrade() {
                        coordinator.time_out(correlation_id);
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    fn time_out(&self, correlation_id: Uuid) {
        {
            let mut active = self.active.lock();
            let Some(wf) = active.get_mut(&correlation_id) else {
                return;
            };
            if !wf.advance(WorkflowStage::TimedOut) {
                return;
            }
            wf.close_reason = Some("workflow deadline exceeded".to_string());
            warn!(
                correlation = %correlation_id,
                "workflow timed out before completion"
            );
        }
        self.finalize(correlation_id);
    }

    async fn persist_decision(
        &self,
        correlation_id: Uuid,
        actor: &DecisionActor,
        decision: &Decision,
    ) {
        let Some(store) = &self.store else { return };
        let label = match decision {
            Decision::AutoApprove => "auto_approved".to_string(),
            Decision::Escalate { reason } => format!("escalated: {reason}"),
            Decision::Close { reason } => format!("closed: {reason}"),
        };
        if let Err(e) = store.save_decision(correlation_id, actor, &label).await {
            warn!(correlation = %correlation_id, error = %e, "decision not persisted");
        }
    }

    async fn persist_human_decision(
        &self,
        correlation_id: Uuid,
        actor: &DecisionActor,
        approved: bool,
    ) {
        let Some(store) = &self.store else { return };
        let label = if approved { "approved" } else { "rejected" };
        if let Err(e) = store.save_decision(correlation_id, actor, label).await {
            warn!(correlation = %correlation_id, error = %e, "decision not persisted");
        }
    }
}

#[async_trait]
impl BusSubscriber for Coordinator {
    fn subscriber_id(&self) -> &str {
        ORCHESTRATOR_ID
    }

    fn consumes(&self) -> &[EventType] {
        CONSUMES
    }

    fn emits(&self) -> &[EventType] {
        EMITS
    }

    /// The coordinator reacts only at the validation gate; consuming
    /// late-stage events never causes an emission, so the cross-product
    /// default would declare edges that cannot occur (and would falsely
    /// close a cycle with the prediction agent).
    fn edges(&self) -> Vec<(EventType, EventType)> {
        vec![
            (EventType::AnomalyValidated, EventType::PredictionRequested),
            (
                EventType::AnomalyValidated,
                EventType::HumanDecisionRequired,
            ),
            (
                EventType::HumanDecisionResponse,
                EventType::PredictionRequested,
            ),
        ]
    }

    async fn deliver(&self, event: &Event) -> Result<(), AgentError> {
        self.on_event(event).await;
        Ok(())
    }
}
