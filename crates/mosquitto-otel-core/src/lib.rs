//! # mosquitto-otel-core
//!
//! Telemetry normalization engine for bridging Mosquitto's `$SYS/broker/#`
//! statistics and System V message-queue depth into OpenTelemetry.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mosquitto_otel_core::{Engine, OtelMetering};
//!
//! let (engine, failures) = Engine::bootstrap(Arc::new(OtelMetering::global()));
//! for failure in &failures {
//!     eprintln!("instrument not created: {failure}");
//! }
//!
//! // Each $SYS message carries an absolute value; the engine adds the delta.
//! engine.handle("$SYS/broker/clients/connected", b"5").unwrap();
//! engine.handle("$SYS/broker/clients/connected", b"3").unwrap(); // adds -2
//! ```
//!
//! ## Architecture
//!
//! Broker message → [`Engine::handle`] → registry lookup → parse →
//! [`DeltaTracker`] → instrument add.
//!
//! Timer → [`MsgctlSource`] → [`RawQueueStats`] → [`QueueStats`] →
//! [`Engine::record_queue_depth`] → instrument add.
//!
//! Instruments only ever receive deltas, so each one's running total equals
//! the most recent absolute value the source published. A monotonic source
//! that goes backwards gets a freshly created instrument seeded with the new
//! value instead of a negative delta.

pub mod engine;
pub mod error;
pub mod instrument;
pub mod ipc;
pub mod msgqueue;
pub mod otel;
pub mod poller;
pub mod registry;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use engine::{Engine, QUEUE_DEPTH_KEY, Update};
pub use error::{DecodeError, EngineError, MeterError, PollError, QueryError};
pub use instrument::{
    CounterSemantics, Instrument, InstrumentKind, InstrumentSpec, Metering, NumericKind, Value,
};
pub use ipc::{MSG_STAT, MsgctlSource, QueueStatsSource};
pub use msgqueue::{PermissionBlock, QueueStats, RAW_LEN, RawQueueStats};
pub use otel::{GENERATION_ATTR, METER_SCOPE, OtelMetering};
pub use poller::{DEFAULT_INTERVAL, QueuePoller, ScheduledTask, schedule, schedule_with_token};
pub use registry::{
    InstrumentDescriptor, KNOWN_TOPICS, RegistrationFailure, SYS_BASE, SYS_FILTER, TopicRegistry,
    instrument_name,
};
pub use tracker::{DeltaTracker, Observation};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
