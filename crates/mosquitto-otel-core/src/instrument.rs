//! Instrument kinds, values, and the metering seam.
//!
//! The engine never talks to a metrics SDK directly. It asks a [`Metering`]
//! backend for [`Instrument`] handles and pushes signed deltas into them.
//! [`crate::otel::OtelMetering`] is the production backend; tests plug in a
//! recording fake.

use std::fmt;

use crate::error::MeterError;

/// Numeric representation of an instrument's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Integer,
    Float,
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
        }
    }
}

/// How an instrument's upstream value is allowed to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterSemantics {
    /// Lifetime value that only grows; a decrease means the source restarted.
    Monotonic,
    /// Value that legitimately rises and falls.
    Bidirectional,
}

impl fmt::Display for CounterSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monotonic => write!(f, "monotonic"),
            Self::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

/// Concrete instrument flavour: numeric kind and counter semantics in one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    IntegerBidirectional,
    IntegerMonotonic,
    FloatBidirectional,
    FloatMonotonic,
}

impl InstrumentKind {
    pub fn numeric(self) -> NumericKind {
        match self {
            Self::IntegerBidirectional | Self::IntegerMonotonic => NumericKind::Integer,
            Self::FloatBidirectional | Self::FloatMonotonic => NumericKind::Float,
        }
    }

    pub fn semantics(self) -> CounterSemantics {
        match self {
            Self::IntegerMonotonic | Self::FloatMonotonic => CounterSemantics::Monotonic,
            Self::IntegerBidirectional | Self::FloatBidirectional => {
                CounterSemantics::Bidirectional
            }
        }
    }

    /// Parse a textual payload into a value of this kind.
    ///
    /// Whitespace around the number is ignored. Non-finite floats are
    /// rejected, and so are negative values for monotonic instruments.
    pub fn parse(self, text: &str) -> Result<Value, String> {
        let text = text.trim();
        let value = match self.numeric() {
            NumericKind::Integer => Value::Int(text.parse::<i64>().map_err(|e| e.to_string())?),
            NumericKind::Float => {
                let v = text.parse::<f64>().map_err(|e| e.to_string())?;
                if !v.is_finite() {
                    return Err("value is not finite".to_string());
                }
                Value::Float(v)
            }
        };
        if self.semantics() == CounterSemantics::Monotonic && value.is_negative() {
            return Err("negative value for a monotonic instrument".to_string());
        }
        Ok(value)
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntegerBidirectional => write!(f, "i64 up-down counter"),
            Self::IntegerMonotonic => write!(f, "u64 counter"),
            Self::FloatBidirectional => write!(f, "f64 up-down counter"),
            Self::FloatMonotonic => write!(f, "f64 counter"),
        }
    }
}

/// An absolute observation or a signed delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn kind(self) -> NumericKind {
        match self {
            Self::Int(_) => NumericKind::Integer,
            Self::Float(_) => NumericKind::Float,
        }
    }

    pub fn is_negative(self) -> bool {
        match self {
            Self::Int(v) => v < 0,
            Self::Float(v) => v < 0.0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v:+}"),
            Self::Float(v) => write!(f, "{v:+}"),
        }
    }
}

/// Everything a backend needs to build an instrument.
///
/// `generation` starts at 0 and grows by one each time the instrument is
/// recreated after a reset. Backends must keep the series of different
/// generations apart even when name and kind are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentSpec<'a> {
    pub name: &'a str,
    pub kind: InstrumentKind,
    pub generation: u32,
}

/// A live instrument accepting signed deltas.
///
/// Monotonic instruments are only ever handed non-negative deltas.
pub trait Instrument: Send + Sync {
    fn add(&self, delta: Value);
}

/// Factory for instruments.
pub trait Metering: Send + Sync {
    /// Create a fresh instrument handle for `spec`.
    fn create(&self, spec: InstrumentSpec<'_>) -> Result<Box<dyn Instrument>, MeterError>;
}
