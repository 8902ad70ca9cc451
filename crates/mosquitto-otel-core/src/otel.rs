//! [`Metering`] backed by the OpenTelemetry metrics API.
//!
//! Kind to instrument mapping:
//! - `IntegerBidirectional` → `UpDownCounter<i64>`
//! - `IntegerMonotonic` → `Counter<u64>`
//! - `FloatBidirectional` → `UpDownCounter<f64>`
//! - `FloatMonotonic` → `Counter<f64>`
//!
//! The SDK hands back the same instrument for a repeated name and kind, so a
//! recreated instrument is told apart by a `generation` attribute on every
//! data point it records. Generation 0 records without attributes. After a
//! reset the earlier series stops changing and the new one starts from zero.

use log::warn;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Meter, UpDownCounter};

use crate::error::MeterError;
use crate::instrument::{Instrument, InstrumentKind, InstrumentSpec, Metering, Value};

/// Instrumentation scope used by the bridge.
pub const METER_SCOPE: &str = "mosquitto";

/// Attribute carrying the instrument generation after a reset.
pub const GENERATION_ATTR: &str = "generation";

const MAX_NAME_LEN: usize = 255;

/// Check `name` against the OpenTelemetry instrument name syntax.
pub fn validate_name(name: &str) -> Result<(), MeterError> {
    let invalid = |reason: &'static str| MeterError::InvalidName {
        name: name.to_string(),
        reason,
    };
    let Some(first) = name.chars().next() else {
        return Err(invalid("empty"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(invalid("must start with an ASCII letter"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("longer than 255 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))
    {
        return Err(invalid("only ASCII letters, digits, '_', '.', '-' and '/' are allowed"));
    }
    Ok(())
}

/// Creates OpenTelemetry instruments from one [`Meter`].
pub struct OtelMetering {
    meter: Meter,
}

impl OtelMetering {
    pub fn new(meter: Meter) -> Self {
        Self { meter }
    }

    /// Use the globally installed meter provider.
    pub fn global() -> Self {
        Self::new(opentelemetry::global::meter(METER_SCOPE))
    }
}

impl Metering for OtelMetering {
    fn create(&self, spec: InstrumentSpec<'_>) -> Result<Box<dyn Instrument>, MeterError> {
        validate_name(spec.name)?;
        let name = spec.name.to_string();
        let counter = match spec.kind {
            InstrumentKind::IntegerBidirectional => {
                OtelCounter::I64UpDown(self.meter.i64_up_down_counter(name).build())
            }
            InstrumentKind::IntegerMonotonic => {
                OtelCounter::U64(self.meter.u64_counter(name).build())
            }
            InstrumentKind::FloatBidirectional => {
                OtelCounter::F64UpDown(self.meter.f64_up_down_counter(name).build())
            }
            InstrumentKind::FloatMonotonic => {
                OtelCounter::F64(self.meter.f64_counter(name).build())
            }
        };
        Ok(Box::new(OtelInstrument {
            counter,
            attributes: generation_attributes(spec.generation),
        }))
    }
}

fn generation_attributes(generation: u32) -> Vec<KeyValue> {
    if generation == 0 {
        Vec::new()
    } else {
        vec![KeyValue::new(GENERATION_ATTR, i64::from(generation))]
    }
}

enum OtelCounter {
    I64UpDown(UpDownCounter<i64>),
    U64(Counter<u64>),
    F64UpDown(UpDownCounter<f64>),
    F64(Counter<f64>),
}

struct OtelInstrument {
    counter: OtelCounter,
    attributes: Vec<KeyValue>,
}

impl Instrument for OtelInstrument {
    fn add(&self, delta: Value) {
        let attrs = self.attributes.as_slice();
        match (&self.counter, delta) {
            (OtelCounter::I64UpDown(c), Value::Int(v)) => c.add(v, attrs),
            (OtelCounter::F64UpDown(c), Value::Float(v)) => c.add(v, attrs),
            (OtelCounter::U64(c), Value::Int(v)) => match u64::try_from(v) {
                Ok(v) => c.add(v, attrs),
                Err(_) => warn!("dropping negative delta {v} for monotonic counter"),
            },
            (OtelCounter::F64(c), Value::Float(v)) if v >= 0.0 => c.add(v, attrs),
            (_, delta) => warn!("dropping delta {delta}: kind or sign does not fit the instrument"),
        }
    }
}
