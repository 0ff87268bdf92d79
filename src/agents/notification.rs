//! # Notification agent: per-channel fan-out with breaker isolation.
//!
//! Sends the booked maintenance task to every configured channel. Each
//! channel sits behind its own circuit breaker and send timeout, so one
//! dead transport neither blocks the others nor stacks delays on the
//! delivery path. The emitted `MaintenanceLogged` event records the
//! per-channel outcomes and closes the workflow loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::NotificationConfig;
use crate::error::AgentError;
use crate::events::{
    DeliveryRecord, Event, EventType, MaintenanceLog, Payload, Schedule,
};
use crate::interfaces::{NotifyChannel, OutboundMessage};
use crate::policies::CircuitBreaker;
use crate::runtime::{Agent, IdempotencyGuard};

struct GuardedChannel {
    transport: Arc<dyn NotifyChannel>,
    breaker: CircuitBreaker,
}

/// Fans maintenance notifications out to the configured channels.
pub struct NotificationAgent {
    cfg: NotificationConfig,
    channels: Vec<GuardedChannel>,
    guard: IdempotencyGuard,
}

impl NotificationAgent {
    /// Creates the agent; every channel gets its own breaker.
    pub fn new(cfg: NotificationConfig, channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        let channels = channels
            .into_iter()
            .map(|transport| GuardedChannel {
                breaker: CircuitBreaker::new(cfg.channel_failure_threshold, cfg.channel_cooldown),
                transport,
            })
            .collect();
        Self {
            cfg,
            channels,
            guard: IdempotencyGuard::new(),
        }
    }

    fn render(schedule: &Schedule) -> OutboundMessage {
        OutboundMessage {
            subject: format!("Maintenance scheduled: {}", schedule.sensor_id),
            body: format!(
                "Task {} for {} ({:?}): window {} .. {}",
                schedule.task_id,
                schedule.sensor_id,
                schedule.urgency,
                schedule.window_start.to_rfc3339(),
                schedule.window_end.to_rfc3339(),
            ),
        }
    }

    async fn send_one(&self, channel: &GuardedChannel, message: &OutboundMessage) -> DeliveryRecord {
        let name = channel.transport.name().to_string();
        if !channel.breaker.allow() {
            return DeliveryRecord {
                channel: name,
                delivered: false,
                detail: "circuit open".to_string(),
            };
        }
        match tokio::time::timeout(self.cfg.send_timeout, channel.transport.send(message)).await {
            Ok(Ok(receipt)) => {
                channel.breaker.record_success();
                DeliveryRecord {
                    channel: name,
                    delivered: true,
                    detail: receipt.receipt,
                }
            }
            Ok(Err(e)) => {
                channel.breaker.record_failure();
                warn!(channel = %name, error = %e, "notification send failed");
                DeliveryRecord {
                    channel: name,
                    delivered: false,
                    detail: e.to_string(),
                }
            }
            Err(_elapsed) => {
                channel.breaker.record_failure();
                warn!(channel = %name, "notification send timed out");
                DeliveryRecord {
                    channel: name,
                    delivered: false,
                    detail: "send timed out".to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Agent for NotificationAgent {
    fn id(&self) -> &str {
        "notification"
    }

    fn capabilities(&self) -> &[&'static str] {
        &["notify_channels"]
    }

    fn consumes(&self) -> &[EventType] {
        &[EventType::MaintenanceScheduled]
    }

    fn emits(&self) -> &[EventType] {
        &[EventType::MaintenanceLogged]
    }

    async fn process(&self, event: &Event) -> Result<Vec<Event>, AgentError> {
        let Payload::MaintenanceScheduled(schedule) = &event.payload else {
            return Err(AgentError::fatal(
                "notification received unexpected payload",
            ));
        };
        if self.guard.seen(event.event_id) {
            return Ok(Vec::new());
        }

        let message = Self::render(schedule);
        let mut deliveries = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            deliveries.push(self.send_one(channel, &message).await);
        }

        // With channels configured but none reachable, the whole event is
        // retryable; the breakers keep the retries cheap.
        if !self.channels.is_empty() && deliveries.iter().all(|d| !d.delivered) {
            return Err(AgentError::transient("all notification channels failed"));
        }
        self.guard.mark(event.event_id);

        Ok(vec![Event::follow(
            event,
            Payload::MaintenanceLogged(MaintenanceLog {
                task_id: schedule.task_id,
                sensor_id: schedule.sensor_id.clone(),
                deliveries,
            }),
        )])
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::{SensorReading, Urgency};
    use crate::interfaces::RecordingChannel;
    use chrono::Utc;
    use uuid::Uuid;

    fn scheduled_event() -> Event {
        let reading = SensorReading::new("S1", 250.0, "°C", 100.0);
        let start = Event::workflow_start(Payload::SensorDataReceived(reading));
        let now = Utc::now();
        Event::follow(
            &start,
            Payload::MaintenanceScheduled(Schedule {
                task_id: Uuid::new_v4(),
                sensor_id: "S1".to_string(),
                urgency: Urgency::Immediate,
                window_start: now,
                window_end: now + chrono::Duration::hours(4),
            }),
        )
    }

    fn log_of(out: &[Event]) -> &MaintenanceLog {
        assert_eq!(out.len(), 1);
        let Payload::MaintenanceLogged(log) = &out[0].payload else {
            panic!("expected MaintenanceLogged");
        };
        log
    }

    #[tokio::test]
    async fn one_dead_channel_does_not_block_the_rest() {
        let healthy = Arc::new(RecordingChannel::new("chat"));
        let dead = Arc::new(RecordingChannel::new("email"));
        dead.set_failing(true);

        let agent = NotificationAgent::new(
            NotificationConfig::default(),
            vec![
                dead.clone() as Arc<dyn NotifyChannel>,
                healthy.clone() as Arc<dyn NotifyChannel>,
            ],
        );

        let out = agent.process(&scheduled_event()).await.expect("ok");
        let log = log_of(&out);
        assert_eq!(log.deliveries.len(), 2);
        assert!(!log.deliveries[0].delivered);
        assert!(log.deliveries[1].delivered);
        assert_eq!(healthy.sent().len(), 1);
    }

    #[tokio::test]
    async fn tripped_channel_is_skipped_not_awaited() {
        let dead = Arc::new(RecordingChannel::new("email"));
        dead.set_failing(true);
        let healthy = Arc::new(RecordingChannel::new("chat"));

        let mut cfg = NotificationConfig::default();
        cfg.channel_failure_threshold = 2;
        cfg.channel_cooldown = Duration::from_secs(600);
        let agent = NotificationAgent::new(
            cfg,
            vec![
                dead.clone() as Arc<dyn NotifyChannel>,
                healthy.clone() as Arc<dyn NotifyChannel>,
            ],
        );

        // Two failures trip the dead channel's breaker.
        agent.process(&scheduled_event()).await.expect("first");
        agent.process(&scheduled_event()).await.expect("second");

        let out = agent.process(&scheduled_event()).await.expect("third");
        let log = log_of(&out);
        assert_eq!(log.deliveries[0].detail, "circuit open");
        assert_eq!(healthy.sent().len(), 3);
    }

    #[tokio::test]
    async fn all_channels_down_is_transient() {
        let dead = Arc::new(RecordingChannel::new("email"));
        dead.set_failing(true);
        let agent = NotificationAgent::new(
            NotificationConfig::default(),
            vec![dead as Arc<dyn NotifyChannel>],
        );

        let err = agent
            .process(&scheduled_event())
            .await
            .expect_err("must fail");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn redelivery_notifies_once() {
        let channel = Arc::new(RecordingChannel::new("chat"));
        let agent = NotificationAgent::new(
            NotificationConfig::default(),
            vec![channel.clone() as Arc<dyn NotifyChannel>],
        );
        let event = scheduled_event();

        let first = agent.process(&event).await.expect("first");
        assert_eq!(first.len(), 1);
        let second = agent.process(&event).await.expect("second");
        assert!(second.is_empty());
        assert_eq!(channel.sent().len(), 1);
    }
}
