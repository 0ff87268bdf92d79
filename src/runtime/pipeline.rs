//! # Pipeline: wires bus, registry, agents and orchestrator.
//!
//! The [`Pipeline`] owns the event bus, the agent registry, the agent
//! handles and the decision coordinator. It starts everything in order,
//! runs until an OS termination signal, and shuts down with a bounded
//! grace period.
//!
//! ## High-level architecture
//! ```text
//! PipelineBuilder::new(cfg)
//!     .with_store(store)
//!     .with_agent(handle) ×N
//!     .build()
//!
//! Pipeline::start()
//!   ├─► Coordinator::attach()            (first, so it observes everything)
//!   └─► AgentHandle::start() per agent   (register + init + subscribe)
//!
//! Pipeline::run()
//!   └─► start() ─► wait_for_shutdown_signal() ─► shutdown()
//!
//! Pipeline::shutdown()
//!   ├─► AgentHandle::stop(grace) per agent   (drain or abandon to DLQ)
//!   ├─► unsubscribe + drain the coordinator
//!   └─► Coordinator::stop()                  (cancels deadline watchers)
//!       stuck agents → RuntimeError::GraceExceeded { stuck }
//! ```
//!
//! The API-gateway boundary is [`Pipeline::ingest`]: it wraps a raw reading
//! into the workflow-opening event and returns the new correlation id for
//! observability queries.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::RuntimeError;
use crate::events::{Event, EventBus, Payload, SensorReading};
use crate::interfaces::Persistence;
use crate::orchestrator::{Coordinator, DecisionPolicy, ORCHESTRATOR_ID};
use crate::runtime::handle::AgentHandle;
use crate::runtime::registry::AgentRegistry;
use crate::runtime::shutdown;

/// Builder for a [`Pipeline`].
pub struct PipelineBuilder {
    cfg: CoreConfig,
    handles: Vec<Arc<AgentHandle>>,
    store: Option<Arc<dyn Persistence>>,
}

impl PipelineBuilder {
    /// Starts a builder from validated configuration.
    pub fn new(cfg: CoreConfig) -> Self {
        Self {
            cfg,
            handles: Vec::new(),
            store: None,
        }
    }

    /// Adds one agent (wrapped in its lifecycle handle).
    pub fn with_agent(mut self, handle: AgentHandle) -> Self {
        self.handles.push(Arc::new(handle));
        self
    }

    /// Persistence used by the coordinator for decision audit records.
    pub fn with_store(mut self, store: Arc<dyn Persistence>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the pipeline: bus, registry and coordinator are created here.
    pub fn build(self) -> Pipeline {
        let bus = EventBus::new(self.cfg.bus.clone());
        let registry = Arc::new(AgentRegistry::new());
        let coordinator = Coordinator::new(
            bus.clone(),
            DecisionPolicy::new(self.cfg.decision.clone()),
            self.cfg.workflow_sla,
            self.store,
        );
        Pipeline {
            cfg: self.cfg,
            bus,
            registry,
            handles: self.handles,
            coordinator,
            started: Mutex::new(false),
        }
    }
}

/// Orchestrates the whole predictive-maintenance pipeline in one process.
pub struct Pipeline {
    cfg: CoreConfig,
    bus: EventBus,
    registry: Arc<AgentRegistry>,
    handles: Vec<Arc<AgentHandle>>,
    coordinator: Arc<Coordinator>,
    started: Mutex<bool>,
}

impl Pipeline {
    /// Entry point for construction.
    pub fn builder(cfg: CoreConfig) -> PipelineBuilder {
        PipelineBuilder::new(cfg)
    }

    /// The shared event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The process-wide agent registry.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// The decision coordinator (workflow-state queries).
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Starts the coordinator and every agent. Idempotent.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        {
            let mut started = self.started.lock();
            if *started {
                return Ok(());
            }
            *started = true;
        }
        self.coordinator.attach()?;
        for handle in &self.handles {
            handle
                .start(&self.bus, &self.registry, self.cfg.startup_timeout)
                .await?;
        }
        Ok(())
    }

    /// Wraps a raw reading into the workflow-opening event and publishes it.
    ///
    /// Returns the new workflow's correlation id.
    pub fn ingest(&self, reading: SensorReading) -> Uuid {
        let event = Event::workflow_start(Payload::SensorDataReceived(reading));
        let correlation_id = event.correlation_id;
        self.bus.publish(event);
        correlation_id
    }

    /// Runs until an OS termination signal, then shuts down gracefully.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.start().await?;
        let _ = shutdown::wait_for_shutdown_signal().await;
        self.shutdown().await
    }

    /// Stops agents (draining up to the configured grace each), then the
    /// coordinator. Idempotent.
    ///
    /// Agents whose queues had to be abandoned are reported in
    /// [`RuntimeError::GraceExceeded`]; their undelivered events are in the
    /// DLQ, not lost.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        {
            let mut started = self.started.lock();
            if !*started {
                return Ok(());
            }
            *started = false;
        }

        let mut stuck = Vec::new();
        for handle in &self.handles {
            if let Err(RuntimeError::GraceExceeded { stuck: s, .. }) = handle
                .stop(&self.bus, &self.registry, self.cfg.grace)
                .await
            {
                stuck.extend(s);
            }
        }

        if let Ok(drain) = self.bus.unsubscribe(ORCHESTRATOR_ID) {
            if !drain.drain(self.cfg.grace).await {
                stuck.push(ORCHESTRATOR_ID.to_string());
            }
        }
        self.coordinator.stop();

        if stuck.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::GraceExceeded {
                grace: self.cfg.grace,
                stuck,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agents::{
        AcquisitionAgent, DetectionAgent, NotificationAgent, PredictionAgent, SchedulingAgent,
        ValidationAgent,
    };
    use crate::events::EventType;
    use crate::interfaces::{MemoryStore, NotifyChannel, RecordingChannel, StaticModelRegistry};
    use crate::orchestrator::WorkflowStage;

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within 5s");
    }

    /// Full golden path: one hot reading flows from ingestion to the logged
    /// maintenance action on a single correlation id, within the SLA.
    #[tokio::test]
    async fn golden_path_end_to_end() {
        let cfg = CoreConfig::demo().validated().expect("config");
        let store = Arc::new(MemoryStore::new());
        let models = Arc::new(StaticModelRegistry::new());
        let channel = Arc::new(RecordingChannel::new("ops"));

        let detection = DetectionAgent::new(cfg.detection.clone(), models);
        let detection_health = detection.health_cell();
        let pipeline = Pipeline::builder(cfg.clone())
            .with_store(store.clone())
            .with_agent(AgentHandle::new(Arc::new(AcquisitionAgent::new(
                cfg.acquisition.clone(),
                store.clone(),
            ))))
            .with_agent(AgentHandle::with_health(detection, detection_health))
            .with_agent(AgentHandle::new(Arc::new(ValidationAgent::new(
                cfg.validation.clone(),
                store.clone(),
                None,
            ))))
            .with_agent(AgentHandle::new(Arc::new(PredictionAgent::new(
                store.clone(),
            ))))
            .with_agent(AgentHandle::new(Arc::new(SchedulingAgent::new())))
            .with_agent(AgentHandle::new(Arc::new(NotificationAgent::new(
                cfg.notification.clone(),
                vec![channel.clone() as Arc<dyn NotifyChannel>],
            ))))
            .build();

        pipeline.start().await.expect("start");
        let correlation = pipeline.ingest(SensorReading::new("S1", 250.0, "°C", 100.0));

        wait_until(|| {
            pipeline
                .coordinator()
                .workflow_state(correlation)
                .map(|wf| wf.stage == WorkflowStage::Logged)
                .unwrap_or(false)
        })
        .await;

        // Every pipeline stage event shares the one correlation id, and each
        // event's causation is its predecessor's id.
        let chain = pipeline.bus().audit().for_correlation(correlation);
        let expected = [
            EventType::SensorDataReceived,
            EventType::DataProcessed,
            EventType::AnomalyDetected,
            EventType::AnomalyValidated,
            EventType::PredictionRequested,
            EventType::MaintenancePredicted,
            EventType::MaintenanceScheduled,
            EventType::MaintenanceLogged,
        ];
        let types: Vec<EventType> = chain.iter().map(|e| e.event_type).collect();
        assert_eq!(types, expected);
        for pair in chain.windows(2) {
            assert!(pair[1].follows(&pair[0]));
        }

        // Notification landed on the channel; nothing was dead-lettered.
        assert_eq!(channel.sent().len(), 1);
        assert!(pipeline.bus().dlq().is_empty());
        assert_eq!(store.reading_count("S1"), 1);
        assert_eq!(store.alerts().len(), 1);

        // Decision audit: exactly one automated approval.
        let wf = pipeline
            .coordinator()
            .workflow_state(correlation)
            .expect("terminal state kept");
        assert_eq!(wf.decision_history.len(), 1);
        assert_eq!(wf.decision_history[0].decision, "auto_approved");

        pipeline.shutdown().await.expect("clean shutdown");
    }

    /// A reading under threshold produces no anomaly and the workflow
    /// simply never progresses past Processed (silence is the normal
    /// signal); no dead letters, no alerts.
    #[tokio::test]
    async fn normal_reading_stays_quiet() {
        let cfg = CoreConfig::demo().validated().expect("config");
        let store = Arc::new(MemoryStore::new());
        let models = Arc::new(StaticModelRegistry::new());

        let detection = DetectionAgent::new(cfg.detection.clone(), models);
        let detection_health = detection.health_cell();
        let pipeline = Pipeline::builder(cfg.clone())
            .with_agent(AgentHandle::new(Arc::new(AcquisitionAgent::new(
                cfg.acquisition.clone(),
                store.clone(),
            ))))
            .with_agent(AgentHandle::with_health(detection, detection_health))
            .build();

        pipeline.start().await.expect("start");
        let correlation = pipeline.ingest(SensorReading::new("S1", 42.0, "°C", 100.0));

        wait_until(|| {
            pipeline
                .coordinator()
                .workflow_state(correlation)
                .map(|wf| wf.stage == WorkflowStage::Processed)
                .unwrap_or(false)
        })
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let chain = pipeline.bus().audit().for_correlation(correlation);
        assert!(chain
            .iter()
            .all(|e| e.event_type != EventType::AnomalyDetected));
        assert!(pipeline.bus().dlq().is_empty());

        pipeline.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test]
    async fn start_and_shutdown_are_idempotent() {
        let cfg = CoreConfig::demo().validated().expect("config");
        let pipeline = Pipeline::builder(cfg).build();
        pipeline.start().await.expect("start");
        pipeline.start().await.expect("second start is a no-op");
        pipeline.shutdown().await.expect("shutdown");
        pipeline.shutdown().await.expect("second shutdown is a no-op");
    }
}
