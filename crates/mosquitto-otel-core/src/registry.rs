//! Known `$SYS/broker/` topics and their instruments.

use std::collections::HashMap;

use crate::error::MeterError;
use crate::instrument::{Instrument, InstrumentKind, InstrumentSpec, Metering};

/// Topic prefix under which Mosquitto publishes its own statistics.
pub const SYS_BASE: &str = "$SYS/broker/";

/// Subscription filter covering every statistics topic.
pub const SYS_FILTER: &str = "$SYS/broker/#";

/// Prefix prepended to a topic suffix to form the instrument name.
pub const INSTRUMENT_PREFIX: &str = "mqtt/";

/// Every statistic suffix we export, with its instrument kind.
pub const KNOWN_TOPICS: &[(&str, InstrumentKind)] = &[
    ("clients/connected", InstrumentKind::IntegerBidirectional),
    ("clients/disconnected", InstrumentKind::IntegerBidirectional),
    ("clients/expired", InstrumentKind::IntegerBidirectional),
    ("clients/maximum", InstrumentKind::IntegerMonotonic),
    ("clients/total", InstrumentKind::IntegerBidirectional),
    ("load/bytes/received/1min", InstrumentKind::FloatBidirectional),
    ("load/bytes/sent/1min", InstrumentKind::FloatBidirectional),
    ("load/messages/received/1min", InstrumentKind::FloatBidirectional),
    ("load/messages/sent/1min", InstrumentKind::FloatBidirectional),
    ("load/publish/dropped/1min", InstrumentKind::FloatBidirectional),
    ("load/publish/received/1min", InstrumentKind::FloatBidirectional),
    ("load/publish/sent/1min", InstrumentKind::FloatBidirectional),
    ("load/sockets/1min", InstrumentKind::FloatBidirectional),
    ("load/connections/1min", InstrumentKind::FloatBidirectional),
    ("heap/current", InstrumentKind::IntegerBidirectional),
    ("heap/maximum", InstrumentKind::IntegerBidirectional),
    ("store/messages/count", InstrumentKind::IntegerBidirectional),
    ("store/messages/bytes", InstrumentKind::IntegerBidirectional),
    ("subscriptions/count", InstrumentKind::IntegerBidirectional),
];

/// Instrument name for a topic suffix.
pub fn instrument_name(suffix: &str) -> String {
    format!("{INSTRUMENT_PREFIX}{suffix}")
}

/// A registered instrument. Key, name and kind are fixed; the handle is
/// swapped, and the generation bumped, when the source resets.
pub struct InstrumentDescriptor {
    pub key: String,
    pub name: String,
    pub kind: InstrumentKind,
    pub generation: u32,
    pub handle: Box<dyn Instrument>,
}

impl InstrumentDescriptor {
    /// Create the descriptor and its first handle.
    pub fn create(
        metering: &dyn Metering,
        key: &str,
        name: String,
        kind: InstrumentKind,
    ) -> Result<Self, MeterError> {
        let handle = metering.create(InstrumentSpec {
            name: &name,
            kind,
            generation: 0,
        })?;
        Ok(Self {
            key: key.to_string(),
            name,
            kind,
            generation: 0,
            handle,
        })
    }

    /// Replace the handle with the next generation of the instrument.
    ///
    /// On failure the current handle and generation stay in place.
    pub fn recreate(&mut self, metering: &dyn Metering) -> Result<(), MeterError> {
        let generation = self.generation.wrapping_add(1);
        self.handle = metering.create(InstrumentSpec {
            name: &self.name,
            kind: self.kind,
            generation,
        })?;
        self.generation = generation;
        Ok(())
    }
}

impl std::fmt::Debug for InstrumentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentDescriptor")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// One instrument that could not be created at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFailure {
    pub key: &'static str,
    pub error: MeterError,
}

impl std::fmt::Display for RegistrationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}

/// Suffix → instrument table.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    entries: HashMap<String, InstrumentDescriptor>,
}

impl TopicRegistry {
    /// Create an instrument for every entry of [`KNOWN_TOPICS`].
    ///
    /// Entries whose instrument cannot be created are left out of the
    /// registry and reported individually in the returned list.
    pub fn bootstrap(metering: &dyn Metering) -> (Self, Vec<RegistrationFailure>) {
        Self::bootstrap_from(metering, KNOWN_TOPICS)
    }

    /// Same as [`TopicRegistry::bootstrap`] over an explicit table.
    pub fn bootstrap_from(
        metering: &dyn Metering,
        table: &'static [(&'static str, InstrumentKind)],
    ) -> (Self, Vec<RegistrationFailure>) {
        let mut entries = HashMap::with_capacity(table.len());
        let mut failures = Vec::new();

        for &(key, kind) in table {
            match InstrumentDescriptor::create(metering, key, instrument_name(key), kind) {
                Ok(desc) => {
                    entries.insert(key.to_string(), desc);
                }
                Err(error) => failures.push(RegistrationFailure { key, error }),
            }
        }

        (Self { entries }, failures)
    }

    pub fn get(&self, key: &str) -> Option<&InstrumentDescriptor> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut InstrumentDescriptor> {
        self.entries.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
