//! Error types for the normalization engine.

use thiserror::Error;

use crate::instrument::NumericKind;

/// Instrument creation failed in the metering backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeterError {
    /// The backend rejects the instrument name.
    #[error("invalid instrument name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
    /// Any other backend-specific refusal.
    #[error("metering backend refused instrument '{name}': {reason}")]
    Backend { name: String, reason: String },
}

/// Failure while handling a broker message or a queue-stats cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Payload could not be read as a value of the topic's numeric kind.
    #[error("cannot parse payload {payload:?} as {kind} for '{key}': {reason}")]
    Parse {
        key: String,
        kind: NumericKind,
        payload: String,
        reason: String,
    },
    /// Observed value variant differs from the variant tracked for the key.
    #[error("value kind {got} does not match tracked kind {expected} for '{key}'")]
    KindMismatch {
        key: String,
        expected: NumericKind,
        got: NumericKind,
    },
    /// The queue-stats instrument was never created.
    #[error("queue statistics are not enabled")]
    QueueStatsDisabled,
    /// Instrument (re)creation failed.
    #[error(transparent)]
    Meter(#[from] MeterError),
}

/// A raw queue-stats buffer is too short to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue stats record needs {expected} bytes, got {got}")]
pub struct DecodeError {
    pub expected: usize,
    pub got: usize,
}

/// The privileged queue-stats query failed.
#[derive(Debug, Error)]
pub enum QueryError {
    /// `msgctl` returned an error.
    #[error("msgctl(MSG_STAT, {index}) failed: {source}")]
    Syscall {
        index: i32,
        #[source]
        source: std::io::Error,
    },
    /// The kernel answer could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// System V message queues are not reachable on this platform.
    #[error("System V message queue statistics are not supported on this platform")]
    Unsupported,
}

/// One queue-stats poll cycle failed.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
