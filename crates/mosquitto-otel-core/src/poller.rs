//! Periodic message-queue depth polling.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::{Engine, Update};
use crate::error::PollError;
use crate::ipc::QueueStatsSource;
use crate::msgqueue::QueueStats;

/// How often the queue is polled unless configured otherwise.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A repeating task that stops when its token is cancelled.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Ask the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait until a cycle that is already running has returned.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("scheduled task ended abnormally: {e}");
        }
    }
}

/// Run `action` every `interval`, first after one full interval.
///
/// Must be called inside a tokio runtime.
pub fn schedule<F>(interval: Duration, action: F) -> ScheduledTask
where
    F: FnMut() + Send + 'static,
{
    schedule_with_token(interval, CancellationToken::new(), action)
}

/// Like [`schedule`], stopping when `token` (typically a child of the
/// process shutdown token) is cancelled.
pub fn schedule_with_token<F>(
    interval: Duration,
    token: CancellationToken,
    mut action: F,
) -> ScheduledTask
where
    F: FnMut() + Send + 'static,
{
    let interval = interval.max(MIN_INTERVAL);
    let task_token = token.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = task_token.cancelled() => break,
                _ = ticker.tick() => action(),
            }
        }
    });
    ScheduledTask { token, handle }
}

/// Feeds the kernel's queued-message count into the engine.
pub struct QueuePoller<S> {
    engine: Arc<Engine>,
    source: S,
}

impl<S: QueueStatsSource + 'static> QueuePoller<S> {
    pub fn new(engine: Arc<Engine>, source: S) -> Self {
        Self { engine, source }
    }

    /// Run one cycle.
    ///
    /// A failed query returns early; the engine's baseline is left as it
    /// was, so the next successful cycle reports the change since the last
    /// successful one.
    pub fn poll_once(&self) -> Result<Update, PollError> {
        let stats = QueueStats::from(self.source.query()?);
        let update = self.engine.record_queue_depth(stats.messages_queued)?;
        debug!(
            "msg queue: {} messages, {} bytes",
            stats.messages_queued, stats.bytes_queued
        );
        Ok(update)
    }

    /// Poll every `interval` until `token` is cancelled.
    pub fn start(self, interval: Duration, token: CancellationToken) -> ScheduledTask {
        schedule_with_token(interval, token, move || {
            if let Err(e) = self.poll_once() {
                warn!("msg queue poll skipped: {e}");
            }
        })
    }
}
