pub mod msgqueue;
pub mod run;
pub mod topics;

use thiserror::Error;

use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;

/// Anything that ends the process with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Query(#[from] mosquitto_otel_core::QueryError),
    #[error("cannot start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("cannot install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("cannot encode output: {0}")]
    Output(#[from] serde_json::Error),
}
