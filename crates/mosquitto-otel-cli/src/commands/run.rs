use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use mosquitto_otel_core::{Engine, MsgctlSource, OtelMetering, QueuePoller};
use tokio_util::sync::CancellationToken;

use super::CliError;
use crate::config::Config;
use crate::{broker, telemetry};

pub fn run(config_path: &Path, force_msgqueue: bool) -> Result<(), CliError> {
    let mut config = Config::load(config_path)?;
    if force_msgqueue {
        config.msgqueue = true;
    }

    let rt = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    rt.block_on(serve(config))
}

async fn serve(config: Config) -> Result<(), CliError> {
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        signal.cancel();
    })?;

    let provider = telemetry::init_meter_provider(&config.otlp)?;

    let (engine, failures) = Engine::bootstrap(Arc::new(OtelMetering::global()));
    for failure in &failures {
        warn!("Could not initialize instrument {failure}");
    }
    let engine = Arc::new(engine);
    info!("{} $SYS topics registered", engine.registered_topics());

    let poller = if config.msgqueue {
        match engine.enable_queue_stats() {
            Ok(()) => {
                let interval = Duration::from_secs(config.msgqueue_interval_secs);
                info!(
                    "Polling msg queue {} every {}s",
                    config.msgqueue_index,
                    interval.as_secs()
                );
                let source = MsgctlSource::new(config.msgqueue_index);
                Some(
                    QueuePoller::new(Arc::clone(&engine), source)
                        .start(interval, shutdown.child_token()),
                )
            }
            Err(e) => {
                warn!("Could not initialize msg queue statistics: {e}");
                None
            }
        }
    } else {
        None
    };

    let session = broker::run_session(&config.mqtt, Arc::clone(&engine), shutdown.clone()).await;

    shutdown.cancel();
    if let Some(task) = poller {
        task.shutdown().await;
    }
    let flushed = telemetry::shutdown(provider);

    match (session, flushed) {
        (Err(e), Err(flush)) => {
            warn!("{flush}");
            Err(e.into())
        }
        (Err(e), Ok(())) => Err(e.into()),
        (Ok(()), flushed) => flushed.map_err(CliError::from),
    }
}
