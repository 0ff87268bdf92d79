//! # AgentHandle: runs one agent against the bus.
//!
//! The handle owns an agent's lifecycle and its bridge onto the bus.
//!
//! ## Wiring
//! ```text
//! AgentHandle::start(bus, registry)
//!   ├─► registry.register(id, capabilities)       status = Starting
//!   ├─► agent.init()                              (bounded by startup timeout)
//!   ├─► bus.subscribe(AgentBridge)                one queue per consumed type
//!   └─► status = Running
//!
//! delivery path (per event):
//!   Bus worker ─► AgentBridge::deliver(&event)
//!                   ├─► agent.process(&event)
//!                   ├─► verify each returned event follows(event)   ← chain guard
//!                   ├─► health.heartbeat() + registry.heartbeat()
//!                   └─► bus.publish(each returned event)
//!
//! AgentHandle::stop(bus, grace)
//!   ├─► bus.unsubscribe(id) ─► drain(grace)       flush or abandon (DLQ)
//!   └─► status = Stopped
//! ```
//!
//! ## Rules
//! - `start`/`stop` are idempotent; repeated calls are no-ops.
//! - Returned events are published only after `process` succeeded, so a
//!   state change is never advertised before it is committed.
//! - A returned event that breaks the correlation/causation chain is a
//!   fatal wiring error: the delivery dead-letters and nothing is
//!   published.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{AgentError, RuntimeError};
use crate::events::{BusSubscriber, Event, EventBus, EventType};
use crate::runtime::agent::Agent;
use crate::runtime::health::{AgentStatus, HealthCell, HealthSnapshot};
use crate::runtime::registry::AgentRegistry;

/// Lifecycle owner for one agent instance.
pub struct AgentHandle {
    agent: Arc<dyn Agent>,
    health: Arc<HealthCell>,
    started: Mutex<bool>,
}

impl AgentHandle {
    /// Wraps an agent with a fresh health cell.
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            health: Arc::new(HealthCell::new()),
            started: Mutex::new(false),
        }
    }

    /// Wraps an agent that shares its health cell with the handle (used by
    /// agents that flag degraded operation themselves).
    pub fn with_health(agent: Arc<dyn Agent>, health: Arc<HealthCell>) -> Self {
        Self {
            agent,
            health,
            started: Mutex::new(false),
        }
    }

    /// The wrapped agent's id.
    pub fn agent_id(&self) -> &str {
        self.agent.id()
    }

    /// Non-blocking health snapshot.
    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Starts the agent: registers capabilities, runs `init` within
    /// `startup_timeout`, subscribes to the bus, flips status to Running.
    ///
    /// Idempotent: a second call while started is a no-op.
    pub async fn start(
        &self,
        bus: &EventBus,
        registry: &Arc<AgentRegistry>,
        startup_timeout: Duration,
    ) -> Result<(), RuntimeError> {
        {
            let mut started = self.started.lock();
            if *started {
                return Ok(());
            }
            *started = true;
        }

        let agent_id = self.agent.id().to_string();
        self.health.set_status(AgentStatus::Starting);
        registry.register(&agent_id, self.agent.capabilities());

        let init = tokio::time::timeout(startup_timeout, self.agent.init()).await;
        match init {
            Err(_elapsed) => {
                self.abort_start(registry, &agent_id);
                return Err(RuntimeError::StartupTimeout {
                    agent_id,
                    timeout: startup_timeout,
                });
            }
            Ok(Err(e)) => {
                self.abort_start(registry, &agent_id);
                return Err(RuntimeError::AgentInit {
                    agent_id,
                    reason: e.to_string(),
                });
            }
            Ok(Ok(())) => {}
        }

        let bridge = Arc::new(AgentBridge {
            agent: Arc::clone(&self.agent),
            health: Arc::clone(&self.health),
            registry: Arc::clone(registry),
            bus: bus.clone(),
        });
        if let Err(e) = bus.subscribe(bridge) {
            self.abort_start(registry, &agent_id);
            return Err(e.into());
        }

        self.health.set_status(AgentStatus::Running);
        registry.update_status(&agent_id, AgentStatus::Running);
        Ok(())
    }

    /// Stops the agent: unsubscribes and drains in-flight deliveries up to
    /// `grace`, then flips status to Stopped.
    ///
    /// Idempotent: a second call while stopped is a no-op. Returns
    /// [`RuntimeError::GraceExceeded`] when queued work had to be abandoned
    /// (it is dead-lettered, not lost).
    pub async fn stop(
        &self,
        bus: &EventBus,
        registry: &Arc<AgentRegistry>,
        grace: Duration,
    ) -> Result<(), RuntimeError> {
        {
            let mut started = self.started.lock();
            if !*started {
                return Ok(());
            }
            *started = false;
        }

        let agent_id = self.agent.id().to_string();
        let drained = match bus.unsubscribe(&agent_id) {
            Ok(drain) => drain.drain(grace).await,
            // Never subscribed (start failed mid-way): nothing to drain.
            Err(_) => true,
        };

        self.health.set_status(AgentStatus::Stopped);
        registry.update_status(&agent_id, AgentStatus::Stopped);

        if drained {
            Ok(())
        } else {
            Err(RuntimeError::GraceExceeded {
                grace,
                stuck: vec![agent_id],
            })
        }
    }

    fn abort_start(&self, registry: &Arc<AgentRegistry>, agent_id: &str) {
        *self.started.lock() = false;
        self.health.set_status(AgentStatus::Stopped);
        registry.update_status(agent_id, AgentStatus::Stopped);
    }
}

/// Bus-facing adapter for one agent.
struct AgentBridge {
    agent: Arc<dyn Agent>,
    health: Arc<HealthCell>,
    registry: Arc<AgentRegistry>,
    bus: EventBus,
}

#[async_trait]
impl BusSubscriber for AgentBridge {
    fn subscriber_id(&self) -> &str {
        self.agent.id()
    }

    fn consumes(&self) -> &[EventType] {
        self.agent.consumes()
    }

    fn emits(&self) -> &[EventType] {
        self.agent.emits()
    }

    fn queue_capacity(&self) -> usize {
        self.agent.queue_capacity()
    }

    async fn deliver(&self, event: &Event) -> Result<(), AgentError> {
        match self.agent.process(event).await {
            Ok(outputs) => {
                for out in &outputs {
                    if !out.follows(event) {
                        let err = AgentError::fatal(format!(
                            "event chain violation: {} emitted {:?} not derived from {}",
                            self.agent.id(),
                            out.event_type,
                            event.event_id
                        ));
                        self.health.record_error(err.to_string());
                        return Err(err);
                    }
                }
                self.health.heartbeat();
                self.registry
                    .heartbeat(self.agent.id(), self.health.status());
                for out in outputs {
                    self.bus.publish(out);
                }
                Ok(())
            }
            Err(e) => {
                self.health
                    .record_error(format!("{}: {e}", e.as_label()));
                self.registry
                    .heartbeat(self.agent.id(), self.health.status());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::config::BusConfig;
    use crate::events::{Payload, SensorReading};

    struct CountingAgent {
        processed: AtomicU32,
        break_chain: bool,
    }

    #[async_trait]
    impl Agent for CountingAgent {
        fn id(&self) -> &str {
            "counting"
        }
        fn capabilities(&self) -> &[&'static str] {
            &["count"]
        }
        fn consumes(&self) -> &[EventType] {
            &[EventType::SensorDataReceived]
        }
        fn emits(&self) -> &[EventType] {
            &[EventType::DataProcessed]
        }

        async fn process(&self, event: &Event) -> Result<Vec<Event>, AgentError> {
            self.processed.fetch_add(1, Ordering::SeqCst);
            let reading = SensorReading::new("S1", 1.0, "°C", 10.0);
            let out = if self.break_chain {
                // Freshly minted correlation: violates the chain on purpose.
                Event::workflow_start(Payload::DataProcessed(
                    crate::events::ProcessedReading {
                        reading,
                        rolling_mean: None,
                        sample_count: 0,
                    },
                ))
            } else {
                Event::follow(
                    event,
                    Payload::DataProcessed(crate::events::ProcessedReading {
                        reading,
                        rolling_mean: None,
                        sample_count: 0,
                    }),
                )
            };
            Ok(vec![out])
        }
    }

    fn reading_event() -> Event {
        Event::workflow_start(Payload::SensorDataReceived(SensorReading::new(
            "S1", 250.0, "°C", 100.0,
        )))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within 2.5s");
    }

    #[tokio::test]
    async fn start_is_idempotent_and_registers() {
        let bus = EventBus::new(BusConfig::default());
        let registry = Arc::new(AgentRegistry::new());
        let handle = AgentHandle::new(Arc::new(CountingAgent {
            processed: AtomicU32::new(0),
            break_chain: false,
        }));

        handle
            .start(&bus, &registry, Duration::from_secs(1))
            .await
            .expect("first start");
        handle
            .start(&bus, &registry, Duration::from_secs(1))
            .await
            .expect("second start is a no-op");

        let descriptor = registry.lookup("counting").expect("registered");
        assert_eq!(descriptor.status, AgentStatus::Running);
        assert_eq!(descriptor.capabilities, vec!["count".to_string()]);
    }

    #[tokio::test]
    async fn processing_publishes_followups_and_heartbeats() {
        let bus = EventBus::new(BusConfig::default());
        let registry = Arc::new(AgentRegistry::new());
        let handle = AgentHandle::new(Arc::new(CountingAgent {
            processed: AtomicU32::new(0),
            break_chain: false,
        }));
        handle
            .start(&bus, &registry, Duration::from_secs(1))
            .await
            .expect("start");

        let inbound = reading_event();
        let correlation = inbound.correlation_id;
        bus.publish(inbound);

        wait_until(|| {
            bus.audit()
                .for_correlation(correlation)
                .iter()
                .any(|e| e.event_type == EventType::DataProcessed)
        })
        .await;

        let chain = bus.audit().for_correlation(correlation);
        assert_eq!(chain.len(), 2);
        assert!(chain[1].follows(&chain[0]));
        assert!(registry
            .lookup("counting")
            .expect("descriptor")
            .last_heartbeat
            .is_some());
    }

    #[tokio::test]
    async fn chain_violation_is_fatal_and_publishes_nothing() {
        let bus = EventBus::new(BusConfig::default());
        let registry = Arc::new(AgentRegistry::new());
        let handle = AgentHandle::new(Arc::new(CountingAgent {
            processed: AtomicU32::new(0),
            break_chain: true,
        }));
        handle
            .start(&bus, &registry, Duration::from_secs(1))
            .await
            .expect("start");

        let inbound = reading_event();
        let correlation = inbound.correlation_id;
        bus.publish(inbound);

        wait_until(|| bus.dlq().len() == 1).await;
        // Only the inbound event and the dead-letter notice share the
        // correlation; the malformed follow-up never hit the bus.
        let chain = bus.audit().for_correlation(correlation);
        assert!(chain
            .iter()
            .all(|e| e.event_type != EventType::DataProcessed));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_marks_stopped() {
        let bus = EventBus::new(BusConfig::default());
        let registry = Arc::new(AgentRegistry::new());
        let handle = AgentHandle::new(Arc::new(CountingAgent {
            processed: AtomicU32::new(0),
            break_chain: false,
        }));
        handle
            .start(&bus, &registry, Duration::from_secs(1))
            .await
            .expect("start");

        handle
            .stop(&bus, &registry, Duration::from_secs(1))
            .await
            .expect("first stop");
        handle
            .stop(&bus, &registry, Duration::from_secs(1))
            .await
            .expect("second stop is a no-op");
        assert_eq!(handle.health().status, AgentStatus::Stopped);
        assert_eq!(
            registry.lookup("counting").expect("kept").status,
            AgentStatus::Stopped
        );
    }

    struct SlowInitAgent;

    #[async_trait]
    impl Agent for SlowInitAgent {
        fn id(&self) -> &str {
            "slow-init"
        }
        fn capabilities(&self) -> &[&'static str] {
            &[]
        }
        fn consumes(&self) -> &[EventType] {
            &[EventType::SensorDataReceived]
        }
        fn emits(&self) -> &[EventType] {
            &[]
        }
        async fn init(&self) -> Result<(), AgentError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
        async fn process(&self, _event: &Event) -> Result<Vec<Event>, AgentError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn startup_timeout_is_bounded() {
        let bus = EventBus::new(BusConfig::default());
        let registry = Arc::new(AgentRegistry::new());
        let handle = AgentHandle::new(Arc::new(SlowInitAgent));

        let err = handle
            .start(&bus, &registry, Duration::from_millis(20))
            .await
            .expect_err("must time out");
        assert!(matches!(err, RuntimeError::StartupTimeout { .. }));
        assert_eq!(handle.health().status, AgentStatus::Stopped);
    }
}
