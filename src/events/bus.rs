//! # Event bus: per-subscriber FIFO delivery with retry and dead-lettering.
//!
//! [`EventBus`] routes each published [`Event`] to every subscriber of its
//! type through an independent bounded queue, so a slow or failing
//! subscriber never blocks the others.
//!
//! ## Architecture
//! ```text
//!  publish(Event)
//!    ├─► AuditLog.append()                     (always, before delivery)
//!    ├─► broadcast tap ──► watch() observers   (no guarantees)
//!    └─► route by event_type
//!          ├─► [queue A/DataProcessed] ─► worker ─► subscriber A.deliver()
//!          ├─► [queue B/DataProcessed] ─► worker ─► subscriber B.deliver()
//!          └─► [queue B/AnomalyDetected] ─► worker ─► ...
//!
//!  worker per (subscriber, event_type):
//!    loop {
//!      ├─► deliver(&event)
//!      │     ├─ Ok            → done (DeliveryAttempt history discarded)
//!      │     ├─ Err(Transient)→ record attempt, sleep backoff, retry
//!      │     │                  (up to RetryPolicy::max_attempts)
//!      │     ├─ Err(Fatal)    → dead-letter immediately
//!      │     └─ panic         → treated as Fatal (caught, isolated)
//!      └─► on exhaustion: DLQ entry + publish EventDeadLettered
//!    }
//! ```
//!
//! ## Rules
//! - **FIFO per queue**; no ordering across subscribers or event types.
//! - **At-least-once**: handlers may see the same `event_id` more than once;
//!   the bus never deduplicates (see `runtime::IdempotencyGuard`).
//! - **No silent loss**: a full queue, an exhausted retry budget, a fatal
//!   error and an abandoned in-flight delivery all leave a DLQ entry.
//! - `EventDeadLettered` is an observability hook: delivered once, never
//!   retried, never itself dead-lettered.
//! - **DAG validation**: a subscription whose consumes→emits edges would
//!   close a cycle in the event-type graph is rejected at subscribe time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::error::{AgentError, BusError};
use crate::events::audit::AuditLog;
use crate::events::dlq::{DeadLetterEntry, DeadLetterQueue, DeliveryAttempt};
use crate::events::event::{Event, EventType, Payload};
use crate::events::payload::DeadLetterNotice;
use crate::policies::{BackoffPolicy, RetryPolicy};

/// Contract for bus subscribers.
///
/// One implementation per agent (or orchestrator). `deliver` is called from
/// a dedicated worker task per consumed event type; implementations classify
/// their failures ([`AgentError::Transient`] vs [`AgentError::Fatal`]) so
/// retry routing is correct, and must tolerate redelivery of the same
/// `event_id` (at-least-once semantics).
#[async_trait]
pub trait BusSubscriber: Send + Sync + 'static {
    /// Stable subscriber id (agent id).
    fn subscriber_id(&self) -> &str;

    /// Event types this subscriber consumes.
    fn consumes(&self) -> &[EventType];

    /// Event types this subscriber may publish in response.
    ///
    /// Used for subscription-time cycle validation; publishing a type not
    /// declared here is a wiring bug.
    fn emits(&self) -> &[EventType];

    /// Capacity of each of this subscriber's delivery queues.
    fn queue_capacity(&self) -> usize {
        256
    }

    /// Causal edges used for cycle validation.
    ///
    /// Default: every consumed type may lead to every emitted type. Override
    /// when reactions are narrower (the orchestrator consumes late-stage
    /// events without ever emitting in response to them).
    fn edges(&self) -> Vec<(EventType, EventType)> {
        self.consumes()
            .iter()
            .flat_map(|c| self.emits().iter().map(move |e| (*c, *e)))
            .collect()
    }

    /// Handle one event.
    async fn deliver(&self, event: &Event) -> Result<(), AgentError>;
}

/// Sender half of one (subscriber, event_type) queue.
struct Route {
    subscriber_id: Arc<str>,
    tx: mpsc::Sender<Event>,
}

/// Book-keeping for one subscriber's active subscription.
struct Subscription {
    token: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    consumes: Vec<EventType>,
    edges: Vec<(EventType, EventType)>,
}

/// In-process publish/subscribe router.
///
/// Cheap to clone; all clones share the same routing table, audit log and
/// DLQ. The `publish`/`subscribe` contract carries no transport detail, so
/// a durable broker can replace the in-memory delivery without touching
/// agent code.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    routes: RwLock<HashMap<EventType, Vec<Route>>>,
    subs: Mutex<HashMap<String, Subscription>>,
    audit: AuditLog,
    dlq: DeadLetterQueue,
    retry: RetryPolicy,
    backoff: BackoffPolicy,
    tap: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus with the given delivery policies.
    pub fn new(cfg: BusConfig) -> Self {
        let (tap, _rx) = broadcast::channel(cfg.tap_capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                routes: RwLock::new(HashMap::new()),
                subs: Mutex::new(HashMap::new()),
                audit: AuditLog::new(),
                dlq: DeadLetterQueue::new(),
                retry: cfg.retry,
                backoff: cfg.backoff,
                tap,
            }),
        }
    }

    /// Publishes an event: audit first, then fan-out to subscriber queues.
    ///
    /// Returns once every delivery is enqueued (fire-and-forget). Enqueue
    /// failures (full/closed queue) dead-letter that one delivery; the bus
    /// itself keeps running.
    pub fn publish(&self, event: Event) {
        self.inner.publish(event);
    }

    /// Registers a subscriber: one bounded queue + worker per consumed type.
    ///
    /// Rejects a subscriber id that is already subscribed
    /// ([`BusError::DuplicateSubscription`]) and any subscription whose
    /// consumes→emits edges would create a cycle in the event-type graph
    /// ([`BusError::CyclicSubscription`]).
    pub fn subscribe(&self, sub: Arc<dyn BusSubscriber>) -> Result<(), BusError> {
        let id = sub.subscriber_id().to_string();
        let consumes: Vec<EventType> = sub.consumes().to_vec();
        let edges = sub.edges();

        let mut subs = self.inner.subs.lock();
        if subs.contains_key(&id) {
            let event_type = consumes
                .first()
                .copied()
                .unwrap_or(EventType::EventDeadLettered);
            return Err(BusError::DuplicateSubscription {
                subscriber: id,
                event_type,
            });
        }
        if let Some(detail) = would_cycle(&subs, &edges) {
            return Err(BusError::CyclicSubscription {
                subscriber: id,
                detail,
            });
        }

        let token = CancellationToken::new();
        let mut workers = Vec::with_capacity(consumes.len());
        {
            let mut routes = self.inner.routes.write();
            for event_type in &consumes {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                routes.entry(*event_type).or_default().push(Route {
                    subscriber_id: Arc::from(id.as_str()),
                    tx,
                });
                workers.push(spawn_worker(
                    Arc::clone(&self.inner),
                    Arc::clone(&sub),
                    rx,
                    token.child_token(),
                ));
            }
        }
        debug!(subscriber = %id, consumes = consumes.len(), "subscribed");
        subs.insert(
            id,
            Subscription {
                token,
                workers,
                consumes,
                edges,
            },
        );
        Ok(())
    }

    /// Removes a subscriber's queues and returns a drain handle.
    ///
    /// Queued deliveries are still processed; await
    /// [`SubscriptionDrain::drain`] to bound that with a grace period.
    pub fn unsubscribe(&self, subscriber_id: &str) -> Result<SubscriptionDrain, BusError> {
        let mut subs = self.inner.subs.lock();
        let sub = subs
            .remove(subscriber_id)
            .ok_or_else(|| BusError::UnknownSubscriber {
                subscriber: subscriber_id.to_string(),
            })?;
        {
            let mut routes = self.inner.routes.write();
            for event_type in &sub.consumes {
                if let Some(list) = routes.get_mut(event_type) {
                    list.retain(|r| &*r.subscriber_id != subscriber_id);
                    if list.is_empty() {
                        routes.remove(event_type);
                    }
                }
            }
        }
        Ok(SubscriptionDrain {
            token: sub.token,
            workers: sub.workers,
        })
    }

    /// Observability tap: every published event, no delivery guarantees.
    pub fn watch(&self) -> broadcast::Receiver<Event> {
        self.inner.tap.subscribe()
    }

    /// The append-only audit log.
    pub fn audit(&self) -> &AuditLog {
        &self.inner.audit
    }

    /// The dead-letter queue.
    pub fn dlq(&self) -> &DeadLetterQueue {
        &self.inner.dlq
    }
}

/// Handle returned by [`EventBus::unsubscribe`]: bounds the wait for queued
/// deliveries to finish.
pub struct SubscriptionDrain {
    token: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriptionDrain {
    /// Waits up to `grace` for the subscriber's workers to drain.
    ///
    /// On timeout the remaining work is abandoned: in-flight and queued
    /// deliveries are dead-lettered by their workers. Returns `true` if
    /// everything drained within the grace period.
    pub async fn drain(self, grace: Duration) -> bool {
        let SubscriptionDrain { token, workers } = self;
        let all = async {
            for w in workers {
                let _ = w.await;
            }
        };
        match tokio::time::timeout(grace, all).await {
            Ok(()) => true,
            Err(_elapsed) => {
                token.cancel();
                false
            }
        }
    }
}

impl BusInner {
    fn publish(self: &Arc<Self>, event: Event) {
        self.audit.append(&event);
        let _ = self.tap.send(event.clone());

        // Collect enqueue failures outside the read guard; dead_letter
        // publishes a follow-up event and must not re-enter the lock.
        let mut rejected: Vec<(Event, String, &'static str)> = Vec::new();
        {
            let routes = self.routes.read();
            match routes.get(&event.event_type) {
                None => {
                    debug!(event_type = event.event_type.as_label(), "no subscribers");
                }
                Some(list) => {
                    for route in list {
                        match route.tx.try_send(event.clone()) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(ev)) => {
                                rejected.push((
                                    ev,
                                    route.subscriber_id.to_string(),
                                    "subscriber queue full",
                                ));
                            }
                            Err(mpsc::error::TrySendError::Closed(ev)) => {
                                rejected.push((
                                    ev,
                                    route.subscriber_id.to_string(),
                                    "subscriber queue closed",
                                ));
                            }
                        }
                    }
                }
            }
        }
        for (ev, subscriber_id, reason) in rejected {
            self.dead_letter(ev, &subscriber_id, Vec::new(), reason);
        }
    }

    /// Seals a failed delivery: DLQ entry + `EventDeadLettered` notice.
    ///
    /// A failed delivery *of* a dead-letter notice is only logged, so the
    /// observability hook can never recurse.
    fn dead_letter(
        self: &Arc<Self>,
        event: Event,
        subscriber_id: &str,
        attempts: Vec<DeliveryAttempt>,
        final_error: impl Into<String>,
    ) {
        let final_error = final_error.into();
        if matches!(event.event_type, EventType::EventDeadLettered) {
            warn!(
                subscriber = subscriber_id,
                error = %final_error,
                "dropping failed dead-letter notice"
            );
            return;
        }
        warn!(
            subscriber = subscriber_id,
            event_type = event.event_type.as_label(),
            event_id = %event.event_id,
            attempts = attempts.len(),
            error = %final_error,
            "delivery dead-lettered"
        );
        let notice = Event::follow(
            &event,
            Payload::EventDeadLettered(DeadLetterNotice {
                original_event_id: event.event_id,
                original_type: event.event_type,
                subscriber_id: subscriber_id.to_string(),
                attempts: attempts.len() as u32,
                last_error: final_error.clone(),
            }),
        );
        self.dlq.push(DeadLetterEntry {
            event,
            subscriber_id: subscriber_id.to_string(),
            attempts,
            final_error,
            dead_lettered_at: Utc::now(),
        });
        self.publish(notice);
    }
}

/// Spawns the worker loop for one (subscriber, event_type) queue.
fn spawn_worker(
    inner: Arc<BusInner>,
    sub: Arc<dyn BusSubscriber>,
    mut rx: mpsc::Receiver<Event>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = token.cancelled() => None,
                msg = rx.recv() => Some(msg),
            };
            match received {
                // Abandoned at shutdown: whatever is still queued gets a
                // DLQ record instead of vanishing.
                None => {
                    while let Ok(ev) = rx.try_recv() {
                        inner.dead_letter(
                            ev,
                            sub.subscriber_id(),
                            Vec::new(),
                            "abandoned: subscriber stopped before delivery",
                        );
                    }
                    break;
                }
                Some(None) => break,
                Some(Some(ev)) => deliver_with_retry(&inner, sub.as_ref(), ev, &token).await,
            }
        }
    })
}

/// Runs one event through the attempt/backoff loop until success,
/// exhaustion, fatal failure or abandonment.
async fn deliver_with_retry(
    inner: &Arc<BusInner>,
    sub: &dyn BusSubscriber,
    event: Event,
    token: &CancellationToken,
) {
    // The dead-letter notice is delivered once and never re-queued.
    let observability = matches!(event.event_type, EventType::EventDeadLettered);
    let max_attempts = if observability {
        1
    } else {
        inner.retry.max_attempts
    };

    let mut history: Vec<DeliveryAttempt> = Vec::new();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let delivered = tokio::select! {
            res = std::panic::AssertUnwindSafe(sub.deliver(&event)).catch_unwind() => Some(res),
            _ = token.cancelled() => None,
        };
        let outcome = match delivered {
            Some(res) => res,
            None => {
                inner.dead_letter(
                    event,
                    sub.subscriber_id(),
                    history,
                    "abandoned: shutdown during delivery",
                );
                return;
            }
        };

        let err = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(panic) => AgentError::fatal(format!("handler panicked: {}", panic_message(panic))),
        };

        let retrying = err.is_retryable() && attempt < max_attempts;
        let delay = inner.backoff.delay(attempt.saturating_sub(1));
        history.push(DeliveryAttempt {
            attempt,
            error: err.to_string(),
            at: Utc::now(),
            next_retry_at: retrying.then(|| {
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
            }),
        });

        if !retrying {
            if observability {
                warn!(
                    subscriber = sub.subscriber_id(),
                    error = %err,
                    "dead-letter notice delivery failed"
                );
            } else {
                let final_error = err.to_string();
                inner.dead_letter(event, sub.subscriber_id(), history, final_error);
            }
            return;
        }

        warn!(
            subscriber = sub.subscriber_id(),
            event_type = event.event_type.as_label(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "delivery failed; retry scheduled"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => {
                inner.dead_letter(
                    event,
                    sub.subscriber_id(),
                    history,
                    "abandoned: shutdown during backoff",
                );
                return;
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Checks whether adding the candidate's causal edges closes a cycle in the
/// event-type graph formed by all active subscriptions.
fn would_cycle(
    subs: &HashMap<String, Subscription>,
    candidate_edges: &[(EventType, EventType)],
) -> Option<String> {
    let mut edges: HashMap<EventType, Vec<EventType>> = HashMap::new();
    for (from, to) in subs
        .values()
        .flat_map(|s| s.edges.iter())
        .chain(candidate_edges.iter())
    {
        edges.entry(*from).or_default().push(*to);
    }

    find_cycle(&edges).map(|path| {
        path.iter()
            .map(|t| t.as_label())
            .collect::<Vec<_>>()
            .join(" -> ")
    })
}

/// DFS three-color cycle search; returns the cycle path if one exists.
fn find_cycle(edges: &HashMap<EventType, Vec<EventType>>) -> Option<Vec<EventType>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(
        node: EventType,
        edges: &HashMap<EventType, Vec<EventType>>,
        marks: &mut HashMap<EventType, Mark>,
        stack: &mut Vec<EventType>,
    ) -> Option<Vec<EventType>> {
        marks.insert(node, Mark::Active);
        stack.push(node);
        for next in edges.get(&node).into_iter().flatten() {
            match marks.get(next).copied().unwrap_or(Mark::New) {
                Mark::Active => {
                    let start = stack.iter().position(|n| n == next).unwrap_or(0);
                    let mut path = stack[start..].to_vec();
                    path.push(*next);
                    return Some(path);
                }
                Mark::New => {
                    if let Some(path) = visit(*next, edges, marks, stack) {
                        return Some(path);
                    }
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    for node in edges.keys() {
        if marks.get(node).copied().unwrap_or(Mark::New) == Mark::New {
            let mut stack = Vec::new();
            if let Some(path) = visit(*node, edges, &mut marks, &mut stack) {
                return Some(path);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::events::{Payload, SensorReading};
    use crate::policies::JitterPolicy;

    fn test_bus(max_attempts: u32) -> EventBus {
        EventBus::new(BusConfig {
            tap_capacity: 64,
            retry: RetryPolicy::new(max_attempts),
            backoff: BackoffPolicy {
                first: Duration::from_millis(1),
                max: Duration::from_millis(5),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
        })
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

    /// Fails the first `fail_first` deliveries transiently, then succeeds.
    struct FlakySubscriber {
        fail_first: u32,
        calls: AtomicU32,
        successes: AtomicU32,
        fatal: bool,
    }

    impl FlakySubscriber {
        fn arc(fail_first: u32, fatal: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_first,
                calls: AtomicU32::new(0),
                successes: AtomicU32::new(0),
                fatal,
            })
        }
    }

    #[async_trait]
    impl BusSubscriber for FlakySubscriber {
        fn subscriber_id(&self) -> &str {
            "flaky"
        }
        fn consumes(&self) -> &[EventType] {
            &[EventType::SensorDataReceived]
        }
        fn emits(&self) -> &[EventType] {
            &[EventType::DataProcessed]
        }
        async fn deliver(&self, _event: &Event) -> Result<(), AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                if self.fatal {
                    return Err(AgentError::fatal("boom"));
                }
                return Err(AgentError::transient(format!("boom #{n}")));
            }
            self.successes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds_without_dead_letter() {
        let bus = test_bus(4);
        let sub = FlakySubscriber::arc(3, false);
        bus.subscribe(sub.clone()).expect("subscribe");

        bus.publish(reading_event());
        wait_until(|| sub.successes.load(Ordering::SeqCst) == 1).await;

        assert_eq!(sub.calls.load(Ordering::SeqCst), 4);
        assert!(bus.dlq().is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter_with_full_history() {
        let bus = test_bus(3);
        let sub = FlakySubscriber::arc(u32::MAX, false);
        bus.subscribe(sub.clone()).expect("subscribe");

        bus.publish(reading_event());
        wait_until(|| bus.dlq().len() == 1).await;

        let entry = &bus.dlq().entries()[0];
        assert_eq!(entry.attempts.len(), 3);
        assert_eq!(entry.attempts.last().map(|a| a.attempt), Some(3));
        assert_eq!(sub.calls.load(Ordering::SeqCst), 3);
        // The observability notice was published on the same correlation.
        wait_until(|| {
            bus.audit()
                .snapshot()
                .iter()
                .any(|e| e.event_type == EventType::EventDeadLettered)
        })
        .await;
    }

    #[tokio::test]
    async fn fatal_failure_dead_letters_on_first_attempt() {
        let bus = test_bus(5);
        let sub = FlakySubscriber::arc(u32::MAX, true);
        bus.subscribe(sub.clone()).expect("subscribe");

        bus.publish(reading_event());
        wait_until(|| bus.dlq().len() == 1).await;

        assert_eq!(sub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.dlq().entries()[0].attempts.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_subscription_is_rejected() {
        let bus = test_bus(3);
        bus.subscribe(FlakySubscriber::arc(0, false))
            .expect("first subscribe");
        let err = bus
            .subscribe(FlakySubscriber::arc(0, false))
            .expect_err("second subscribe must fail");
        assert!(matches!(err, BusError::DuplicateSubscription { .. }));
    }

    /// Subscriber with arbitrary consume/emit edges for graph tests.
    struct EdgeSubscriber {
        id: String,
        consumes: Vec<EventType>,
        emits: Vec<EventType>,
    }

    #[async_trait]
    impl BusSubscriber for EdgeSubscriber {
        fn subscriber_id(&self) -> &str {
            &self.id
        }
        fn consumes(&self) -> &[EventType] {
            &self.consumes
        }
        fn emits(&self) -> &[EventType] {
            &self.emits
        }
        async fn deliver(&self, _event: &Event) -> Result<(), AgentError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cyclic_subscription_is_rejected() {
        let bus = test_bus(3);
        bus.subscribe(Arc::new(EdgeSubscriber {
            id: "forward".into(),
            consumes: vec![EventType::DataProcessed],
            emits: vec![EventType::AnomalyDetected],
        }))
        .expect("acyclic subscribe");

        let err = bus
            .subscribe(Arc::new(EdgeSubscriber {
                id: "backward".into(),
                consumes: vec![EventType::AnomalyDetected],
                emits: vec![EventType::DataProcessed],
            }))
            .expect_err("cycle must be rejected");
        assert!(matches!(err, BusError::CyclicSubscription { .. }));
    }

    #[tokio::test]
    async fn self_loop_is_rejected() {
        let bus = test_bus(3);
        let err = bus
            .subscribe(Arc::new(EdgeSubscriber {
                id: "echo".into(),
                consumes: vec![EventType::DataProcessed],
                emits: vec![EventType::DataProcessed],
            }))
            .expect_err("self-loop must be rejected");
        assert!(matches!(err, BusError::CyclicSubscription { .. }));
    }

    /// Records the order of delivered event ids.
    struct RecordingSubscriber {
        seen: parking_lot::Mutex<Vec<uuid::Uuid>>,
    }

    #[async_trait]
    impl BusSubscriber for RecordingSubscriber {
        fn subscriber_id(&self) -> &str {
            "recorder"
        }
        fn consumes(&self) -> &[EventType] {
            &[EventType::SensorDataReceived]
        }
        fn emits(&self) -> &[EventType] {
            &[]
        }
        async fn deliver(&self, event: &Event) -> Result<(), AgentError> {
            self.seen.lock().push(event.event_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivery_is_fifo_per_subscriber() {
        let bus = test_bus(3);
        let sub = Arc::new(RecordingSubscriber {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        bus.subscribe(sub.clone()).expect("subscribe");

        let events: Vec<Event> = (0..10).map(|_| reading_event()).collect();
        let ids: Vec<_> = events.iter().map(|e| e.event_id).collect();
        for e in events {
            bus.publish(e);
        }
        wait_until(|| sub.seen.lock().len() == 10).await;
        assert_eq!(*sub.seen.lock(), ids);
    }

    #[tokio::test]
    async fn unsubscribe_drains_queued_work() {
        let bus = test_bus(3);
        let sub = Arc::new(RecordingSubscriber {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        bus.subscribe(sub.clone()).expect("subscribe");
        for _ in 0..5 {
            bus.publish(reading_event());
        }
        let drain = bus.unsubscribe("recorder").expect("unsubscribe");
        assert!(drain.drain(Duration::from_secs(2)).await);
        assert_eq!(sub.seen.lock().len(), 5);
        assert!(bus.unsubscribe("recorder").is_err());
    }
}
