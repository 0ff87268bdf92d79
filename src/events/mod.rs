//! Pipeline events: data model, bus, dead-letter queue, audit log.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to the events that drive the maintenance pipeline from
//! sensor ingestion to the logged maintenance action.
//!
//! ## Contents
//! - [`Event`], [`EventType`], [`Payload`] — immutable envelope with
//!   correlation/causation chain and typed per-stage payloads
//! - [`EventBus`], [`BusSubscriber`] — per-subscriber FIFO delivery with
//!   retry, backoff and dead-lettering
//! - [`DeadLetterQueue`], [`DeadLetterEntry`] — poison-message store
//! - [`AuditLog`] — append-only record of every published event
//!
//! ## Quick reference
//! - **Publishers**: agent handles (after a successful `process`), the
//!   orchestrator (gating events), the bus itself (`EventDeadLettered`).
//! - **Consumers**: one [`BusSubscriber`] per agent plus the orchestrator's
//!   coordinator; passive observers use [`EventBus::watch`].
//!
//! See `events/bus.rs` for the delivery wiring diagram.

mod audit;
mod bus;
mod dlq;
mod event;
mod payload;

pub use audit::AuditLog;
pub use bus::{BusSubscriber, EventBus, SubscriptionDrain};
pub use dlq::{DeadLetterEntry, DeadLetterQueue, DeliveryAttempt};
pub use event::{Event, EventType, Payload, SCHEMA_VERSION};
pub use payload::{
    Anomaly, DeadLetterNotice, DecisionActor, DeliveryRecord, DetectorKind, EscalationRequest,
    HumanDecision, MaintenanceLog, Prediction, PredictionRequest, ProcessedReading, Schedule,
    SensorReading, Severity, Urgency, Validation, ValidationFlag, ValidationVerdict,
};
