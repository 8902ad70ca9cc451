//! MQTT session against the broker's `$SYS` tree.
//!
//! The session subscribes to [`SYS_FILTER`] once the broker acknowledges the
//! connection and hands every publish to the [`Engine`]. Losing the
//! connection ends the session; there is no reconnect.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use mosquitto_otel_core::{Engine, SYS_FILTER};
use rumqttc::{AsyncClient, ConnectionError, Event, MqttOptions, Packet, QoS};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::MqttConfig;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection to {address} lost: {source}")]
    Connection {
        address: String,
        #[source]
        source: ConnectionError,
    },
    #[error("cannot subscribe to {SYS_FILTER}: {0}")]
    Subscribe(#[source] rumqttc::ClientError),
}

pub fn options(config: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    opts.set_credentials(config.username.clone(), config.password.clone());
    opts.set_keep_alive(KEEP_ALIVE);
    opts.set_clean_session(true);
    opts
}

/// Run until `shutdown` is cancelled or the connection fails.
pub async fn run_session(
    config: &MqttConfig,
    engine: Arc<Engine>,
    shutdown: CancellationToken,
) -> Result<(), BrokerError> {
    let address = format!("{}:{}", config.host, config.port);
    let (client, mut eventloop) = AsyncClient::new(options(config), REQUEST_CAPACITY);
    info!("Connecting to MQTT broker at {address}");

    loop {
        let event = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                if let Err(e) = client.disconnect().await {
                    debug!("disconnect request not sent: {e}");
                }
                info!("Disconnected from {address}");
                return Ok(());
            }
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to {address}");
                client
                    .subscribe(SYS_FILTER, QoS::AtMostOnce)
                    .await
                    .map_err(BrokerError::Subscribe)?;
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => info!("Subscribed to {SYS_FILTER}"),
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch(&engine, &publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(source) => return Err(BrokerError::Connection { address, source }),
        }
    }
}

/// Feed one `$SYS` message to the engine, logging rejects.
pub fn dispatch(engine: &Engine, topic: &str, payload: &[u8]) {
    match engine.handle(topic, payload) {
        Ok(Some(update)) => debug!("{topic}: {}", update.delta),
        Ok(None) => {}
        Err(e) => warn!(
            "Failed to handle {topic} payload {:?}: {e}",
            String::from_utf8_lossy(payload)
        ),
    }
}
