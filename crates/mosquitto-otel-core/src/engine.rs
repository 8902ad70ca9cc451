//! The normalization engine: `$SYS` message dispatch and queue-depth updates.
//!
//! Both activation paths (broker messages and the queue-stats poller) go
//! through one [`Engine`]. Registry, tracker and the queue instrument sit
//! behind a single mutex that is held for the whole observe-and-apply step,
//! so a delta is never computed against one baseline and applied after
//! another path has moved it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::error::{EngineError, MeterError};
use crate::instrument::{CounterSemantics, InstrumentKind, Metering, Value};
use crate::registry::{InstrumentDescriptor, RegistrationFailure, SYS_BASE, TopicRegistry};
use crate::tracker::{DeltaTracker, Observation};

/// Tracker key and instrument name for the message-queue depth.
pub const QUEUE_DEPTH_KEY: &str = "ipcs/msg/qnum";

/// What an accepted observation did to its instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub key: String,
    pub delta: Value,
    /// The instrument was recreated and seeded with `delta`.
    pub reset: bool,
}

struct EngineState {
    registry: TopicRegistry,
    tracker: DeltaTracker,
    queue: Option<InstrumentDescriptor>,
}

/// Shared telemetry state for both activation paths.
pub struct Engine {
    metering: Arc<dyn Metering>,
    state: Mutex<EngineState>,
}

impl Engine {
    /// Build the topic registry and an empty tracker.
    ///
    /// Instruments that could not be created are returned one by one; the
    /// engine still serves every topic that did register.
    pub fn bootstrap(metering: Arc<dyn Metering>) -> (Self, Vec<RegistrationFailure>) {
        let (registry, failures) = TopicRegistry::bootstrap(metering.as_ref());
        (Self::with_registry(metering, registry), failures)
    }

    /// Wrap an already built registry.
    pub fn with_registry(metering: Arc<dyn Metering>, registry: TopicRegistry) -> Self {
        Self {
            metering,
            state: Mutex::new(EngineState {
                registry,
                tracker: DeltaTracker::new(),
                queue: None,
            }),
        }
    }

    // The baseline is committed only after the instrument took the delta, so
    // a poisoned guard still holds a baseline matching the live instrument.
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one message from the broker.
    ///
    /// Returns `Ok(None)` for topics outside `$SYS/broker/` and for suffixes
    /// we do not export. A payload that does not parse is an error and leaves
    /// all state untouched.
    pub fn handle(&self, topic: &str, payload: &[u8]) -> Result<Option<Update>, EngineError> {
        match topic.strip_prefix(SYS_BASE) {
            Some(suffix) => self.handle_suffix(suffix, payload),
            None => Ok(None),
        }
    }

    /// Handle a message whose topic has already been stripped of [`SYS_BASE`].
    pub fn handle_suffix(
        &self,
        suffix: &str,
        payload: &[u8],
    ) -> Result<Option<Update>, EngineError> {
        let mut guard = self.lock();
        let EngineState {
            registry, tracker, ..
        } = &mut *guard;

        let Some(desc) = registry.get_mut(suffix) else {
            return Ok(None);
        };

        let value = parse_payload(desc, payload)?;
        let observation = tracker.compute(suffix, desc.kind.semantics(), value)?;
        apply(self.metering.as_ref(), desc, observation)?;
        tracker.commit(suffix, value);

        Ok(Some(Update {
            key: suffix.to_string(),
            delta: observation.delta,
            reset: observation.reset,
        }))
    }

    /// Create the queue-depth instrument. Calling it again is a no-op.
    pub fn enable_queue_stats(&self) -> Result<(), MeterError> {
        let mut guard = self.lock();
        if guard.queue.is_none() {
            guard.queue = Some(InstrumentDescriptor::create(
                self.metering.as_ref(),
                QUEUE_DEPTH_KEY,
                QUEUE_DEPTH_KEY.to_string(),
                InstrumentKind::IntegerBidirectional,
            )?);
        }
        Ok(())
    }

    pub fn queue_stats_enabled(&self) -> bool {
        self.lock().queue.is_some()
    }

    /// Feed the current number of queued messages into the depth instrument.
    pub fn record_queue_depth(&self, messages: u64) -> Result<Update, EngineError> {
        let mut guard = self.lock();
        let EngineState { tracker, queue, .. } = &mut *guard;
        let desc = queue.as_mut().ok_or(EngineError::QueueStatsDisabled)?;

        let value = Value::Int(i64::try_from(messages).unwrap_or(i64::MAX));
        let observation =
            tracker.compute(QUEUE_DEPTH_KEY, CounterSemantics::Bidirectional, value)?;
        apply(self.metering.as_ref(), desc, observation)?;
        tracker.commit(QUEUE_DEPTH_KEY, value);

        Ok(Update {
            key: QUEUE_DEPTH_KEY.to_string(),
            delta: observation.delta,
            reset: observation.reset,
        })
    }

    /// Last absolute value recorded for `key`.
    pub fn last_value(&self, key: &str) -> Option<Value> {
        self.lock().tracker.last(key)
    }

    /// Number of topics with a live instrument.
    pub fn registered_topics(&self) -> usize {
        self.lock().registry.len()
    }
}

fn parse_payload(desc: &InstrumentDescriptor, payload: &[u8]) -> Result<Value, EngineError> {
    let parse_error = |reason: String| EngineError::Parse {
        key: desc.key.clone(),
        kind: desc.kind.numeric(),
        payload: String::from_utf8_lossy(payload).into_owned(),
        reason,
    };
    let text = std::str::from_utf8(payload).map_err(|e| parse_error(e.to_string()))?;
    desc.kind.parse(text).map_err(parse_error)
}

/// Add the observation to the live instrument, recreating it first on reset.
///
/// A failed recreate leaves the old handle in place and adds nothing; the
/// caller keeps the old baseline so the next value retries the reset.
fn apply(
    metering: &dyn Metering,
    desc: &mut InstrumentDescriptor,
    observation: Observation,
) -> Result<(), MeterError> {
    if observation.reset {
        match desc.kind.semantics() {
            CounterSemantics::Monotonic => info!(
                "{} went backwards, recreating {} seeded with {}",
                desc.key, desc.name, observation.delta
            ),
            CounterSemantics::Bidirectional => warn!(
                "{} delta overflows i64, recreating {} seeded with {}",
                desc.key, desc.name, observation.delta
            ),
        }
        desc.recreate(metering)?;
    }
    desc.handle.add(observation.delta);
    debug!("{} {}", desc.name, observation.delta);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::NumericKind;
    use crate::test_support::RecordingMetering;

    fn engine() -> (Engine, RecordingMetering) {
        let metering = RecordingMetering::default();
        let (engine, failures) = Engine::bootstrap(Arc::new(metering.clone()));
        assert!(failures.is_empty());
        (engine, metering)
    }

    #[test]
    fn bidirectional_topic_sequence() {
        let (engine, metering) = engine();
        for payload in ["5", "8", "8", "3"] {
            engine
                .handle("$SYS/broker/clients/connected", payload.as_bytes())
                .unwrap()
                .unwrap();
        }
        assert_eq!(
            metering.deltas("mqtt/clients/connected"),
            vec![Value::Int(5), Value::Int(3), Value::Int(0), Value::Int(-5)]
        );
        assert_eq!(metering.total_int("mqtt/clients/connected"), 3);
        assert_eq!(metering.generations("mqtt/clients/connected"), 1);
    }

    #[test]
    fn monotonic_reset_recreates_instrument() {
        let (engine, metering) = engine();
        let mut updates = Vec::new();
        for payload in ["10", "12", "12", "7"] {
            updates.push(
                engine
                    .handle("$SYS/broker/clients/maximum", payload.as_bytes())
                    .unwrap()
                    .unwrap(),
            );
        }
        assert!(updates[..3].iter().all(|u| !u.reset));
        assert!(updates[3].reset);
        assert_eq!(updates[3].delta, Value::Int(7));

        let name = "mqtt/clients/maximum";
        assert_eq!(metering.generations(name), 2);
        assert_eq!(
            metering.deltas_for_generation(name, 0),
            vec![Value::Int(10), Value::Int(2), Value::Int(0)]
        );
        assert_eq!(metering.deltas_for_generation(name, 1), vec![Value::Int(7)]);
        assert!(metering.deltas(name).iter().all(|d| !d.is_negative()));
    }

    #[test]
    fn float_topic() {
        let (engine, metering) = engine();
        engine.handle("$SYS/broker/load/sockets/1min", b"1.5").unwrap();
        engine.handle("$SYS/broker/load/sockets/1min", b"0.75").unwrap();
        assert_eq!(
            metering.deltas("mqtt/load/sockets/1min"),
            vec![Value::Float(1.5), Value::Float(-0.75)]
        );
    }

    #[test]
    fn malformed_payload_changes_nothing() {
        let (engine, metering) = engine();
        engine.handle("$SYS/broker/clients/connected", b"4").unwrap();
        let before = metering.records().len();

        let err = engine
            .handle("$SYS/broker/clients/connected", b"abc")
            .unwrap_err();
        match err {
            EngineError::Parse { key, kind, payload, .. } => {
                assert_eq!(key, "clients/connected");
                assert_eq!(kind, NumericKind::Integer);
                assert_eq!(payload, "abc");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(metering.records().len(), before);
        assert_eq!(engine.last_value("clients/connected"), Some(Value::Int(4)));
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let (engine, _) = engine();
        let err = engine
            .handle("$SYS/broker/heap/current", &[0xff, 0xfe])
            .unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));
        assert_eq!(engine.last_value("heap/current"), None);
    }

    #[test]
    fn float_on_integer_topic_is_rejected() {
        let (engine, metering) = engine();
        assert!(engine.handle("$SYS/broker/heap/current", b"1.5").is_err());
        assert!(metering.records().is_empty());
    }

    #[test]
    fn unknown_topics_are_ignored() {
        let (engine, metering) = engine();
        assert_eq!(engine.handle("$SYS/broker/foo/bar", b"1").unwrap(), None);
        assert_eq!(engine.handle("foo/bar", b"1").unwrap(), None);
        assert_eq!(
            engine.handle("$SYS/broker/version", b"mosquitto 2.0").unwrap(),
            None
        );
        assert!(metering.records().is_empty());
        assert_eq!(engine.last_value("foo/bar"), None);
    }

    #[test]
    fn queue_depth_requires_enable() {
        let (engine, metering) = engine();
        assert_eq!(
            engine.record_queue_depth(3),
            Err(EngineError::QueueStatsDisabled)
        );
        engine.enable_queue_stats().unwrap();
        engine.enable_queue_stats().unwrap();
        assert_eq!(metering.generations(QUEUE_DEPTH_KEY), 1);

        engine.record_queue_depth(3).unwrap();
        let u = engine.record_queue_depth(1).unwrap();
        assert_eq!(u.delta, Value::Int(-2));
        assert_eq!(metering.total_int(QUEUE_DEPTH_KEY), 1);
    }

    #[test]
    fn recreate_failure_keeps_total_and_retries() {
        let (engine, metering) = engine();
        let name = "mqtt/clients/maximum";
        engine.handle("$SYS/broker/clients/maximum", b"10").unwrap();

        metering.refuse(name);
        let err = engine
            .handle("$SYS/broker/clients/maximum", b"2")
            .unwrap_err();
        assert!(matches!(err, EngineError::Meter(_)));
        assert_eq!(engine.last_value("clients/maximum"), Some(Value::Int(10)));
        assert_eq!(metering.total_int_for_generation(name, 0), 10);

        // Still refused: the old instrument keeps matching the baseline.
        assert!(engine.handle("$SYS/broker/clients/maximum", b"5").is_err());
        assert_eq!(metering.total_int_for_generation(name, 0), 10);

        metering.allow(name);
        let u = engine
            .handle("$SYS/broker/clients/maximum", b"5")
            .unwrap()
            .unwrap();
        assert!(u.reset);
        assert_eq!(metering.total_int_for_generation(name, 1), 5);
        assert_eq!(engine.last_value("clients/maximum"), Some(Value::Int(5)));

        engine.handle("$SYS/broker/clients/maximum", b"8").unwrap();
        assert_eq!(metering.total_int_for_generation(name, 1), 8);
    }

    #[test]
    fn recreated_instrument_gets_next_generation() {
        let (engine, metering) = engine();
        for payload in ["10", "7", "3"] {
            engine
                .handle("$SYS/broker/clients/maximum", payload.as_bytes())
                .unwrap();
        }
        assert_eq!(
            metering.spec_generations("mqtt/clients/maximum"),
            vec![0, 1, 2]
        );
        assert_eq!(
            metering.total_int_for_generation("mqtt/clients/maximum", 2),
            3
        );
    }

    #[test]
    fn bidirectional_overflow_recreates() {
        let (engine, metering) = engine();
        let topic = "$SYS/broker/heap/current";
        engine.handle(topic, i64::MIN.to_string().as_bytes()).unwrap();
        let u = engine.handle(topic, b"100").unwrap().unwrap();
        assert!(u.reset);
        assert_eq!(u.delta, Value::Int(100));
        assert_eq!(
            metering.total_int_for_generation("mqtt/heap/current", 1),
            100
        );

        let u = engine.handle(topic, b"40").unwrap().unwrap();
        assert_eq!(u.delta, Value::Int(-60));
        assert_eq!(
            metering.total_int_for_generation("mqtt/heap/current", 1),
            40
        );
    }
}
