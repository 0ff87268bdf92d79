//! # upkeep
//!
//! **upkeep** is the event-driven coordination substrate for a
//! predictive-maintenance pipeline: a typed publish/subscribe bus with
//! retry and dead-lettering, an agent runtime with lifecycle and health
//! reporting, and an orchestrator that turns a chain of asynchronous events
//! into an auditable workflow with human-in-the-loop decision points.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     sensor reading ──► Pipeline::ingest()
//!                              │
//!                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBus                                                         │
//! │  - AuditLog (append-only, every published event)                  │
//! │  - per-(subscriber, event_type) FIFO queues + workers             │
//! │  - retry with backoff → DeadLetterQueue on exhaustion             │
//! └───┬───────────┬───────────┬───────────┬───────────┬──────────┬────┘
//!     ▼           ▼           ▼           ▼           ▼          ▼
//! Acquisition  Detection  Validation  Prediction  Scheduling  Notification
//!     │           │           │           ▲           │          │
//!     │           │           ▼           │           │          │
//!     │           │     ┌─────────────────┴──────┐    │          │
//!     │           │     │ Coordinator            │    │          │
//!     │           │     │ - WorkflowState per    │    │          │
//!     │           │     │   correlation_id       │    │          │
//!     │           │     │ - policy: auto vs      │    │          │
//!     │           │     │   human escalation     │    │          │
//!     │           │     │ - SLA deadline watcher │    │          │
//!     │           │     └────────────────────────┘    │          │
//!     ▼           ▼                                   ▼          ▼
//!  AgentRegistry (descriptors, capabilities, health aggregation)
//! ```
//!
//! ### Event chain
//! Every workflow shares one `correlation_id`; each event's `causation_id`
//! is the `event_id` of its immediate predecessor:
//! ```text
//! SensorDataReceived → DataProcessed → AnomalyDetected → AnomalyValidated
//!   → (PredictionRequested | HumanDecisionRequired → HumanDecisionResponse)
//!   → MaintenancePredicted → MaintenanceScheduled → MaintenanceLogged
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                       |
//! |-------------------|-------------------------------------------------------------------|------------------------------------------|
//! | **Event model**   | Immutable envelopes with correlation/causation chains.            | [`Event`], [`EventType`], [`Payload`]    |
//! | **Bus**           | Per-subscriber FIFO delivery, retry, DLQ, audit log.              | [`EventBus`], [`BusSubscriber`]          |
//! | **Policies**      | Retry budgets, backoff, jitter, circuit breaking.                 | [`RetryPolicy`], [`BackoffPolicy`], [`CircuitBreaker`] |
//! | **Agent runtime** | Uniform lifecycle, capability registry, health reporting.         | [`Agent`], [`AgentHandle`], [`AgentRegistry`] |
//! | **Agents**        | Acquisition → detection → validation → prediction → scheduling → notification. | [`agents`]                  |
//! | **Orchestration** | Explicit stage machine, decisions, SLA timeouts.                  | [`Coordinator`], [`WorkflowStage`]       |
//! | **Interfaces**    | Narrow seams for store, models, rules, channels.                  | [`interfaces`]                           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] observer
//!   _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use upkeep::agents::{AcquisitionAgent, DetectionAgent};
//! use upkeep::config::CoreConfig;
//! use upkeep::events::SensorReading;
//! use upkeep::interfaces::{MemoryStore, StaticModelRegistry};
//! use upkeep::{AgentHandle, Pipeline};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = CoreConfig::default().validated()?;
//!     let store = Arc::new(MemoryStore::new());
//!     let models = Arc::new(StaticModelRegistry::new());
//!
//!     let detection = DetectionAgent::new(cfg.detection.clone(), models);
//!     let detection_health = detection.health_cell();
//!
//!     let pipeline = Pipeline::builder(cfg.clone())
//!         .with_store(store.clone())
//!         .with_agent(AgentHandle::new(Arc::new(AcquisitionAgent::new(
//!             cfg.acquisition.clone(),
//!             store.clone(),
//!         ))))
//!         .with_agent(AgentHandle::with_health(detection, detection_health))
//!         .build();
//!
//!     pipeline.start().await?;
//!     let correlation = pipeline.ingest(SensorReading::new("temp-01", 42.0, "°C", 100.0));
//!     let _state = pipeline.coordinator().workflow_state(correlation);
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod interfaces;
pub mod orchestrator;
pub mod policies;
pub mod runtime;

// ---- Public re-exports ----

pub use config::CoreConfig;
pub use error::{AgentError, BusError, ConfigError, RegistryError, RuntimeError};
pub use events::{BusSubscriber, Event, EventBus, EventType, Payload};
pub use orchestrator::{Coordinator, WorkflowStage, WorkflowState};
pub use policies::{BackoffPolicy, CircuitBreaker, JitterPolicy, RetryPolicy};
pub use runtime::{
    Agent, AgentHandle, AgentRegistry, AgentStatus, HealthCell, IdempotencyGuard, Pipeline,
};

// Optional: a simple console observer over the bus tap (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
mod logwriter;
#[cfg(feature = "logging")]
pub use logwriter::LogWriter;
