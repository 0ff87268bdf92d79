//! # Simple console observer for debugging and demos.
//!
//! [`LogWriter`] taps the bus ([`EventBus::watch`]) and logs every published
//! event through `tracing`. It rides the observability tap, so it adds no
//! delivery guarantees and no back-pressure on agents.
//!
//! Not intended for production use — ship events to real telemetry by
//! subscribing your own observer to `watch()`.

use tracing::info;

use crate::events::{EventBus, EventType};

/// Console observer over the bus tap.
///
/// Enabled via the `logging` feature.
pub struct LogWriter;

impl LogWriter {
    /// Spawns a background task logging every published event.
    ///
    /// The task ends when the bus is dropped.
    pub fn attach(bus: &EventBus) {
        let mut rx = bus.watch();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        info!(
                            event_type = event.event_type.as_label(),
                            event_id = %event.event_id,
                            correlation = %event.correlation_id,
                            dead_letter = matches!(event.event_type, EventType::EventDeadLettered),
                            "bus event"
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        info!(skipped, "log writer lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Installs a minimal `tracing` console subscriber (demo convenience).
    ///
    /// Respects `RUST_LOG`; falls back to `info`.
    pub fn init() {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init();
    }
}
