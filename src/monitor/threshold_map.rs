//! Bucketed classification of a numeric reading into an ordinal state.
//!
//! A map is a floor state plus an ordered table of `(state, lower_bound)`
//! bands. Classification picks the band with the greatest lower bound that is
//! `<=` the value, or the floor when the value is below every bound.
//!
//! Sentinel states (sensor fault, no sensor) never appear in the table, so
//! numeric comparison can never reach them.

use std::fmt;

/// Construction errors for a [`ThresholdMap`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("threshold for {state} is not finite ({bound})")]
    NonFinite { state: String, bound: f64 },
    #[error("threshold for {state} ({bound}) must be greater than the threshold for {previous} ({previous_bound})")]
    NotIncreasing {
        state: String,
        bound: f64,
        previous: String,
        previous_bound: f64,
    },
    #[error("state {state} is out of ordinal order (must rank above {previous})")]
    StateOrder { state: String, previous: String },
}

/// Sorted, bucketed lookup from a measurement to a discrete state.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdMap<S> {
    floor: S,
    bands: Vec<(S, f64)>,
}

impl<S> ThresholdMap<S>
where
    S: Copy + Ord + fmt::Debug,
{
    /// Build a map from a floor state and its bands.
    ///
    /// Bounds must be finite and strictly increasing, and states must rank
    /// strictly above the floor and above each other in table order. This
    /// keeps `classify` monotonic.
    pub fn new(floor: S, bands: Vec<(S, f64)>) -> Result<Self, ThresholdError> {
        let mut previous: Option<(S, f64)> = None;
        for &(state, bound) in &bands {
            if !bound.is_finite() {
                return Err(ThresholdError::NonFinite {
                    state: format!("{state:?}"),
                    bound,
                });
            }
            let (prev_state, prev_bound) = match previous {
                Some((s, b)) => (s, Some(b)),
                None => (floor, None),
            };
            if state <= prev_state {
                return Err(ThresholdError::StateOrder {
                    state: format!("{state:?}"),
                    previous: format!("{prev_state:?}"),
                });
            }
            if let Some(prev_bound) = prev_bound {
                if bound <= prev_bound {
                    return Err(ThresholdError::NotIncreasing {
                        state: format!("{state:?}"),
                        bound,
                        previous: format!("{prev_state:?}"),
                        previous_bound: prev_bound,
                    });
                }
            }
            previous = Some((state, bound));
        }
        Ok(Self { floor, bands })
    }

    /// Classify a value. Total: NaN lands on the floor.
    pub fn classify(&self, value: f64) -> S {
        self.bands
            .iter()
            .rev()
            .find(|(_, bound)| *bound <= value)
            .map_or(self.floor, |(state, _)| *state)
    }

    pub fn floor(&self) -> S {
        self.floor
    }

    /// Configured bands in ascending order.
    pub fn bands(&self) -> &[(S, f64)] {
        &self.bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Band {
        Off,
        Low,
        Mid,
        High,
    }

    fn map() -> ThresholdMap<Band> {
        ThresholdMap::new(Band::Off, vec![(Band::Low, 10.0), (Band::Mid, 50.0), (Band::High, 90.0)])
            .unwrap()
    }

    #[test]
    fn test_classify_picks_greatest_bound_not_above_value() {
        let m = map();
        assert_eq!(m.classify(-5.0), Band::Off);
        assert_eq!(m.classify(9.999), Band::Off);
        assert_eq!(m.classify(10.0), Band::Low);
        assert_eq!(m.classify(49.0), Band::Low);
        assert_eq!(m.classify(50.0), Band::Mid);
        assert_eq!(m.classify(1e9), Band::High);
    }

    #[test]
    fn test_classify_nan_is_floor() {
        assert_eq!(map().classify(f64::NAN), Band::Off);
    }

    #[test]
    fn test_classify_is_monotonic() {
        let m = map();
        let mut last = m.classify(-100.0);
        let mut x = -100.0;
        while x < 200.0 {
            let s = m.classify(x);
            assert!(s >= last, "classify({x}) = {s:?} dropped below {last:?}");
            last = s;
            x += 0.5;
        }
    }

    #[test]
    fn test_rejects_non_increasing_bounds() {
        let err = ThresholdMap::new(Band::Off, vec![(Band::Low, 10.0), (Band::Mid, 10.0)]).unwrap_err();
        assert!(matches!(err, ThresholdError::NotIncreasing { .. }));
    }

    #[test]
    fn test_rejects_out_of_order_states() {
        let err = ThresholdMap::new(Band::Off, vec![(Band::Mid, 10.0), (Band::Low, 20.0)]).unwrap_err();
        assert!(matches!(err, ThresholdError::StateOrder { .. }));

        let err = ThresholdMap::new(Band::Low, vec![(Band::Off, 10.0)]).unwrap_err();
        assert!(matches!(err, ThresholdError::StateOrder { .. }));
    }

    #[test]
    fn test_rejects_non_finite_bound() {
        let err = ThresholdMap::new(Band::Off, vec![(Band::Low, f64::INFINITY)]).unwrap_err();
        assert!(matches!(err, ThresholdError::NonFinite { .. }));
    }

    #[test]
    fn test_empty_table_always_floor() {
        let m: ThresholdMap<Band> = ThresholdMap::new(Band::Off, Vec::new()).unwrap();
        assert_eq!(m.classify(1234.0), Band::Off);
    }
}
