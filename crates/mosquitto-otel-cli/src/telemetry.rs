//! OpenTelemetry SDK pipeline: periodic OTLP/gRPC metric export.

use std::time::Duration;

use log::info;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use thiserror::Error;

use crate::config::OtlpConfig;

pub const SERVICE_NAME: &str = "mosquitto-otel";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("cannot build OTLP exporter for {endpoint}: {reason}")]
    Exporter { endpoint: String, reason: String },
    #[error("meter provider shutdown failed: {0}")]
    Shutdown(String),
}

/// Build the meter provider and install it globally.
///
/// Must be called inside a tokio runtime; the periodic reader spawns its
/// export task there.
pub fn init_meter_provider(config: &OtlpConfig) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone())
        .build()
        .map_err(|e| TelemetryError::Exporter {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(Duration::from_secs(config.export_interval_secs))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            SERVICE_NAME,
        )]))
        .build();

    opentelemetry::global::set_meter_provider(provider.clone());
    info!(
        "OpenTelemetry metrics export to {} every {}s",
        config.endpoint, config.export_interval_secs
    );
    Ok(provider)
}

/// Flush pending metrics and stop the export task.
pub fn shutdown(provider: SdkMeterProvider) -> Result<(), TelemetryError> {
    provider
        .shutdown()
        .map_err(|e| TelemetryError::Shutdown(e.to_string()))
}
