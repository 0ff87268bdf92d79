//! # Scheduling agent: books the maintenance window.
//!
//! Booking is the canonical exactly-once side effect: the agent checks its
//! idempotency guard before acting, so a redelivered prediction books at
//! most one task.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::error::AgentError;
use crate::events::{Event, EventType, Payload, Schedule, Urgency};
use crate::runtime::{Agent, IdempotencyGuard};

/// Books maintenance tasks for predicted failures.
#[derive(Default)]
pub struct SchedulingAgent {
    guard: IdempotencyGuard,
}

impl SchedulingAgent {
    /// Creates the agent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lead time and window length per urgency band.
    fn window(urgency: Urgency) -> (ChronoDuration, ChronoDuration) {
        match urgency {
            Urgency::Immediate => (ChronoDuration::hours(1), ChronoDuration::hours(4)),
            Urgency::Urgent => (ChronoDuration::hours(12), ChronoDuration::hours(8)),
            Urgency::Planned => (ChronoDuration::days(3), ChronoDuration::hours(8)),
            Urgency::Routine => (ChronoDuration::days(14), ChronoDuration::hours(8)),
        }
    }
}

#[async_trait]
impl Agent for SchedulingAgent {
    fn id(&self) -> &str {
        "scheduling"
    }

    fn capabilities(&self) -> &[&'static str] {
        &["schedule_maintenance"]
    }

    fn consumes(&self) -> &[EventType] {
        &[EventType::MaintenancePredicted]
    }

    fn emits(&self) -> &[EventType] {
        &[EventType::MaintenanceScheduled]
    }

    async fn process(&self, event: &Event) -> Result<Vec<Event>, AgentError> {
        let Payload::MaintenancePredicted(prediction) = &event.payload else {
            return Err(AgentError::fatal("scheduling received unexpected payload"));
        };
        if self.guard.seen(event.event_id) {
            return Ok(Vec::new());
        }

        let (lead, length) = Self::window(prediction.urgency);
        let window_start = Utc::now() + lead;
        let schedule = Schedule {
            task_id: Uuid::new_v4(),
            sensor_id: prediction.sensor_id.clone(),
            urgency: prediction.urgency,
            window_start,
            window_end: window_start + length,
        };
        self.guard.mark(event.event_id);

        Ok(vec![Event::follow(
            event,
            Payload::MaintenanceScheduled(schedule),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Prediction, SensorReading, Severity};

    fn predicted_event(urgency: Urgency) -> Event {
        let reading = SensorReading::new("S1", 250.0, "°C", 100.0);
        let start = Event::workflow_start(Payload::SensorDataReceived(reading));
        Event::follow(
            &start,
            Payload::MaintenancePredicted(Prediction {
                sensor_id: "S1".to_string(),
                severity: Severity::Critical,
                confidence: 0.9,
                days_to_failure: 2.0,
                urgency,
            }),
        )
    }

    #[tokio::test]
    async fn books_a_window_matching_urgency() {
        let agent = SchedulingAgent::new();
        let out = agent
            .process(&predicted_event(Urgency::Immediate))
            .await
            .expect("ok");
        assert_eq!(out.len(), 1);
        let Payload::MaintenanceScheduled(s) = &out[0].payload else {
            panic!("expected schedule");
        };
        assert_eq!(s.sensor_id, "S1");
        assert!(s.window_start < s.window_end);
        assert!(s.window_start - Utc::now() <= ChronoDuration::hours(1));
    }

    #[tokio::test]
    async fn same_event_id_books_at_most_one_task() {
        let agent = SchedulingAgent::new();
        let event = predicted_event(Urgency::Urgent);

        let first = agent.process(&event).await.expect("first");
        assert_eq!(first.len(), 1);
        let second = agent.process(&event).await.expect("second");
        assert!(second.is_empty());
    }
}
