//! Recording metering backend for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::MeterError;
use crate::instrument::{Instrument, InstrumentSpec, Metering, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub generation: u32,
    pub delta: Value,
}

#[derive(Default)]
struct Inner {
    records: Vec<Record>,
    created: HashMap<String, Vec<u32>>,
    refused: HashSet<String>,
}

/// Every `add` is appended to a shared log, tagged with the generation the
/// instrument was created for.
#[derive(Clone, Default)]
pub struct RecordingMetering {
    inner: Arc<Mutex<Inner>>,
}

struct RecordingInstrument {
    name: String,
    generation: u32,
    inner: Arc<Mutex<Inner>>,
}

impl Instrument for RecordingInstrument {
    fn add(&self, delta: Value) {
        self.inner.lock().unwrap().records.push(Record {
            name: self.name.clone(),
            generation: self.generation,
            delta,
        });
    }
}

impl Metering for RecordingMetering {
    fn create(&self, spec: InstrumentSpec<'_>) -> Result<Box<dyn Instrument>, MeterError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.refused.contains(spec.name) {
            return Err(MeterError::Backend {
                name: spec.name.to_string(),
                reason: "refused by test".to_string(),
            });
        }
        inner
            .created
            .entry(spec.name.to_string())
            .or_default()
            .push(spec.generation);
        Ok(Box::new(RecordingInstrument {
            name: spec.name.to_string(),
            generation: spec.generation,
            inner: Arc::clone(&self.inner),
        }))
    }
}

impl RecordingMetering {
    /// Make later `create` calls for `name` fail.
    pub fn refuse(&self, name: &str) {
        self.inner.lock().unwrap().refused.insert(name.to_string());
    }

    pub fn allow(&self, name: &str) {
        self.inner.lock().unwrap().refused.remove(name);
    }

    pub fn records(&self) -> Vec<Record> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn deltas(&self, name: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r.name == name)
            .map(|r| r.delta)
            .collect()
    }

    pub fn deltas_for_generation(&self, name: &str, generation: u32) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r.name == name && r.generation == generation)
            .map(|r| r.delta)
            .collect()
    }

    /// How many instruments have been created under `name`.
    pub fn generations(&self, name: &str) -> usize {
        self.spec_generations(name).len()
    }

    /// The generation requested by each successful `create` for `name`.
    pub fn spec_generations(&self, name: &str) -> Vec<u32> {
        self.inner
            .lock()
            .unwrap()
            .created
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_int(&self, name: &str) -> i64 {
        sum_ints(name, self.deltas(name))
    }

    /// Running total of one generation's series.
    pub fn total_int_for_generation(&self, name: &str, generation: u32) -> i64 {
        sum_ints(name, self.deltas_for_generation(name, generation))
    }
}

fn sum_ints(name: &str, deltas: Vec<Value>) -> i64 {
    deltas
        .into_iter()
        .map(|d| match d {
            Value::Int(v) => v,
            Value::Float(v) => panic!("float delta {v} on integer instrument {name}"),
        })
        .sum()
}
