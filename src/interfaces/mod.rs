//! External collaborators, consumed through narrow async traits.
//!
//! The core never talks to a database, model store, rule engine or
//! notification transport directly — each is a trait object injected into
//! the agent that needs it, so the real integrations stay outside this
//! crate. In-memory implementations back demos and tests.
//!
//! ## Contents
//! - [`Persistence`] / [`MemoryStore`] — readings, alerts, decisions
//! - [`ModelRegistry`] / [`AnomalyModel`] — model recommendation + loading
//! - [`RuleEngine`] / [`BuiltinRules`] — pluggable validation rules
//! - [`NotifyChannel`] / [`ConsoleChannel`] / [`RecordingChannel`]
//!
//! All collaborator failures are typed; agents classify them as transient
//! (store/channel outages) or degrade gracefully (model/rule fallbacks).

mod channels;
mod models;
mod persistence;
mod rules;

pub use channels::{
    ChannelError, ConsoleChannel, DeliveryReceipt, NotifyChannel, OutboundMessage,
    RecordingChannel,
};
pub use models::{
    AnomalyModel, ModelError, ModelRef, ModelRegistry, StaticModelRegistry, ThresholdRatioModel,
};
pub use persistence::{DecisionRow, MemoryStore, Persistence, StoreError};
pub use rules::{BuiltinRules, RuleEngine, RuleError, RuleScore};
