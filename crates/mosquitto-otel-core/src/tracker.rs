//! Absolute-to-delta conversion with reset detection.
//!
//! Metric instruments downstream are additive: they accumulate whatever is
//! added to them. Upstream sources publish absolute values. The tracker keeps
//! the last absolute value per key and turns each new observation into the
//! signed difference, so the running total of an instrument always equals the
//! most recent absolute value.
//!
//! For monotonic keys a decrease is a restart of the upstream counter. The
//! tracker then reports a reset and hands back the absolute value as the seed
//! for a freshly created instrument instead of a negative delta. An integer
//! difference too large for an i64 is handled the same way for any key.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::instrument::{CounterSemantics, Value};

/// Result of one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Amount to add to the instrument. On reset this is the new baseline.
    pub delta: Value,
    /// The instrument must be recreated and seeded with `delta`: a monotonic
    /// source went backwards, or the difference overflowed.
    pub reset: bool,
}

/// Per-key last-value table.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    last: HashMap<String, Value>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `key` and return what the instrument should see.
    ///
    /// Shorthand for [`DeltaTracker::compute`] followed by
    /// [`DeltaTracker::commit`].
    pub fn observe(
        &mut self,
        key: &str,
        semantics: CounterSemantics,
        value: Value,
    ) -> Result<Observation, EngineError> {
        let observation = self.compute(key, semantics, value)?;
        self.commit(key, value);
        Ok(observation)
    }

    /// What observing `value` for `key` would produce, without moving the
    /// baseline.
    ///
    /// An integer difference that does not fit in an i64 is reported as a
    /// reset seeded with `value`, whatever the semantics.
    pub fn compute(
        &self,
        key: &str,
        semantics: CounterSemantics,
        value: Value,
    ) -> Result<Observation, EngineError> {
        let Some(&last) = self.last.get(key) else {
            return Ok(Observation {
                delta: value,
                reset: false,
            });
        };
        let reset = Observation {
            delta: value,
            reset: true,
        };

        let observation = match (last, value) {
            (Value::Int(prev), Value::Int(cur)) => {
                if semantics == CounterSemantics::Monotonic && cur < prev {
                    reset
                } else {
                    match cur.checked_sub(prev) {
                        Some(delta) => Observation {
                            delta: Value::Int(delta),
                            reset: false,
                        },
                        None => reset,
                    }
                }
            }
            (Value::Float(prev), Value::Float(cur)) => {
                if semantics == CounterSemantics::Monotonic && cur < prev {
                    reset
                } else {
                    Observation {
                        delta: Value::Float(cur - prev),
                        reset: false,
                    }
                }
            }
            _ => {
                return Err(EngineError::KindMismatch {
                    key: key.to_string(),
                    expected: last.kind(),
                    got: value.kind(),
                });
            }
        };
        Ok(observation)
    }

    /// Make `value` the baseline for `key`.
    pub fn commit(&mut self, key: &str, value: Value) {
        match self.last.get_mut(key) {
            Some(last) => *last = value,
            None => {
                self.last.insert(key.to_string(), value);
            }
        }
    }

    /// Last absolute value seen for `key`.
    pub fn last(&self, key: &str) -> Option<Value> {
        self.last.get(key).copied()
    }

    /// Number of keys observed so far.
    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::NumericKind;

    fn ints(
        tracker: &mut DeltaTracker,
        key: &str,
        s: CounterSemantics,
        vals: &[i64],
    ) -> Vec<Observation> {
        vals.iter()
            .map(|&v| tracker.observe(key, s, Value::Int(v)).unwrap())
            .collect()
    }

    #[test]
    fn first_observation_is_absolute() {
        let mut t = DeltaTracker::new();
        let o = t
            .observe("k", CounterSemantics::Bidirectional, Value::Int(7))
            .unwrap();
        assert_eq!(o.delta, Value::Int(7));
        assert!(!o.reset);
        assert_eq!(t.last("k"), Some(Value::Int(7)));
    }

    #[test]
    fn bidirectional_deltas_telescope() {
        let mut t = DeltaTracker::new();
        let obs = ints(
            &mut t,
            "clients/connected",
            CounterSemantics::Bidirectional,
            &[5, 8, 8, 3],
        );
        let deltas: Vec<Value> = obs.iter().map(|o| o.delta).collect();
        assert_eq!(
            deltas,
            vec![Value::Int(5), Value::Int(3), Value::Int(0), Value::Int(-5)]
        );
        assert!(obs.iter().all(|o| !o.reset));
        let sum: i64 = deltas
            .iter()
            .map(|d| match d {
                Value::Int(v) => *v,
                Value::Float(_) => unreachable!(),
            })
            .sum();
        assert_eq!(sum, 3);
    }

    #[test]
    fn monotonic_decrease_is_a_reset() {
        let mut t = DeltaTracker::new();
        let obs = ints(
            &mut t,
            "clients/maximum",
            CounterSemantics::Monotonic,
            &[10, 12, 12, 7],
        );
        assert_eq!(obs[0].delta, Value::Int(10));
        assert_eq!(obs[1].delta, Value::Int(2));
        assert_eq!(obs[2].delta, Value::Int(0));
        assert!(!obs[..3].iter().any(|o| o.reset));
        assert_eq!(
            obs[3],
            Observation {
                delta: Value::Int(7),
                reset: true
            }
        );
        assert_eq!(t.last("clients/maximum"), Some(Value::Int(7)));

        // After a reset, deltas are relative to the new baseline.
        let o = t
            .observe("clients/maximum", CounterSemantics::Monotonic, Value::Int(9))
            .unwrap();
        assert_eq!(o.delta, Value::Int(2));
        assert!(!o.reset);
    }

    #[test]
    fn float_monotonic_reset() {
        let mut t = DeltaTracker::new();
        t.observe("f", CounterSemantics::Monotonic, Value::Float(2.5))
            .unwrap();
        let o = t
            .observe("f", CounterSemantics::Monotonic, Value::Float(1.0))
            .unwrap();
        assert!(o.reset);
        assert_eq!(o.delta, Value::Float(1.0));
    }

    #[test]
    fn float_bidirectional_delta() {
        let mut t = DeltaTracker::new();
        t.observe("load", CounterSemantics::Bidirectional, Value::Float(1.5))
            .unwrap();
        let o = t
            .observe("load", CounterSemantics::Bidirectional, Value::Float(0.5))
            .unwrap();
        assert_eq!(o.delta, Value::Float(-1.0));
        assert!(!o.reset);
    }

    #[test]
    fn kind_mismatch_leaves_state() {
        let mut t = DeltaTracker::new();
        t.observe("k", CounterSemantics::Bidirectional, Value::Int(4))
            .unwrap();
        let err = t
            .observe("k", CounterSemantics::Bidirectional, Value::Float(4.0))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::KindMismatch {
                key: "k".to_string(),
                expected: NumericKind::Integer,
                got: NumericKind::Float,
            }
        );
        assert_eq!(t.last("k"), Some(Value::Int(4)));
    }

    #[test]
    fn overflow_rebaselines_as_reset() {
        let mut t = DeltaTracker::new();
        t.observe("k", CounterSemantics::Bidirectional, Value::Int(i64::MIN))
            .unwrap();
        let o = t
            .observe("k", CounterSemantics::Bidirectional, Value::Int(1))
            .unwrap();
        assert_eq!(
            o,
            Observation {
                delta: Value::Int(1),
                reset: true
            }
        );
        assert_eq!(t.last("k"), Some(Value::Int(1)));

        let o = t
            .observe("k", CounterSemantics::Bidirectional, Value::Int(-4))
            .unwrap();
        assert_eq!(o.delta, Value::Int(-5));
        assert!(!o.reset);
    }

    #[test]
    fn compute_does_not_move_baseline() {
        let mut t = DeltaTracker::new();
        assert_eq!(
            t.compute("k", CounterSemantics::Monotonic, Value::Int(3))
                .unwrap()
                .delta,
            Value::Int(3)
        );
        assert!(t.is_empty());

        t.observe("k", CounterSemantics::Monotonic, Value::Int(10))
            .unwrap();
        let o = t
            .compute("k", CounterSemantics::Monotonic, Value::Int(2))
            .unwrap();
        assert!(o.reset);
        assert_eq!(t.last("k"), Some(Value::Int(10)));

        t.commit("k", Value::Int(2));
        assert_eq!(t.last("k"), Some(Value::Int(2)));
    }

    #[test]
    fn keys_are_independent() {
        let mut t = DeltaTracker::new();
        t.observe("a", CounterSemantics::Bidirectional, Value::Int(1))
            .unwrap();
        let o = t
            .observe("b", CounterSemantics::Bidirectional, Value::Int(9))
            .unwrap();
        assert_eq!(o.delta, Value::Int(9));
        assert_eq!(t.len(), 2);
    }
}
