//! Scalar recursive smoothing filters keyed by pattern and feature index.
//!
//! Every (pattern, feature-index) pair owns one filter state, created lazily
//! on first observation. Filters are strictly sequential: the order in which
//! values are fed determines the output.

use crate::core::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default measurement noise (R).
pub const DEFAULT_MEASUREMENT_NOISE: f64 = 0.01;

/// Default process noise (Q).
pub const DEFAULT_PROCESS_NOISE: f64 = 0.1;

/// Recursive estimator state for one scalar signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Current estimate
    pub estimate: f64,
    /// Error covariance of the estimate
    pub covariance: f64,
}

impl FilterState {
    /// Initialize from the first observation.
    fn initial(raw: f64, measurement_noise: f64) -> Self {
        Self {
            estimate: raw,
            covariance: measurement_noise,
        }
    }

    /// Predict, compute gain, and update toward `raw`.
    fn step(&mut self, raw: f64, measurement_noise: f64, process_noise: f64) -> f64 {
        let predicted = self.covariance + process_noise;
        let gain = predicted / (predicted + measurement_noise);
        self.estimate += gain * (raw - self.estimate);
        self.covariance = (1.0 - gain) * predicted;
        self.estimate
    }
}

/// Filter states for every registered pattern.
#[derive(Debug, Clone)]
pub struct FilterBank {
    measurement_noise: f64,
    process_noise: f64,
    states: HashMap<String, BTreeMap<usize, FilterState>>,
}

impl FilterBank {
    pub fn new(measurement_noise: f64, process_noise: f64) -> Self {
        Self {
            measurement_noise,
            process_noise,
            states: HashMap::new(),
        }
    }

    /// Smooth one raw value for `pattern` at `feature_index`.
    pub fn filter(&mut self, pattern: &str, feature_index: usize, raw: f64) -> f64 {
        let (r, q) = (self.measurement_noise, self.process_noise);
        let states = self.states.entry(pattern.to_string()).or_default();

        match states.get_mut(&feature_index) {
            Some(state) => state.step(raw, r, q),
            None => {
                states.insert(feature_index, FilterState::initial(raw, r));
                raw
            }
        }
    }

    /// Smooth every component of a feature vector, in index order.
    pub fn filter_vector(&mut self, pattern: &str, features: &FeatureVector) -> FeatureVector {
        features
            .iter()
            .enumerate()
            .map(|(i, &raw)| self.filter(pattern, i, raw))
            .collect::<Vec<_>>()
            .into()
    }

    /// Current state for one feature of a pattern, if it has been observed.
    pub fn state(&self, pattern: &str, feature_index: usize) -> Option<&FilterState> {
        self.states.get(pattern)?.get(&feature_index)
    }

    /// A bank with the same noise constants holding a copy of one pattern's
    /// states, or none at all when `pattern` is `None`.
    pub fn fork(&self, pattern: Option<&str>) -> FilterBank {
        let mut bank = FilterBank::new(self.measurement_noise, self.process_noise);
        if let Some((name, states)) = pattern.and_then(|p| self.states.get_key_value(p)) {
            bank.states.insert(name.clone(), states.clone());
        }
        bank
    }

    /// Discard all feature states for a pattern.
    pub fn remove_pattern(&mut self, pattern: &str) -> bool {
        self.states.remove(pattern).is_some()
    }

    /// Number of patterns with at least one filter state.
    pub fn pattern_count(&self) -> usize {
        self.states.len()
    }

    pub fn measurement_noise(&self) -> f64 {
        self.measurement_noise
    }

    pub fn process_noise(&self) -> f64 {
        self.process_noise
    }
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::new(DEFAULT_MEASUREMENT_NOISE, DEFAULT_PROCESS_NOISE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_passes_through() {
        let mut bank = FilterBank::default();
        assert_eq!(bank.filter("kettle", 0, 0.42), 0.42);
        let state = bank.state("kettle", 0).unwrap();
        assert_eq!(state.covariance, DEFAULT_MEASUREMENT_NOISE);
    }

    #[test]
    fn test_deterministic_sequence() {
        let inputs = [0.1, 0.9, 0.4, 0.4, 0.7, 0.0, 1.0];
        let run = || {
            let mut bank = FilterBank::default();
            inputs
                .iter()
                .map(|&v| bank.filter("washer", 2, v))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_estimate_moves_toward_measurement() {
        let mut bank = FilterBank::default();
        bank.filter("p", 0, 0.0);
        let next = bank.filter("p", 0, 1.0);
        assert!(next > 0.0 && next < 1.0);
        // With Q >> R the gain is close to one.
        assert!(next > 0.9);
    }

    #[test]
    fn test_covariance_stays_bounded() {
        let mut bank = FilterBank::default();
        for i in 0..100_000 {
            bank.filter("p", 0, (i % 7) as f64 / 7.0);
        }
        let state = bank.state("p", 0).unwrap();
        assert!(state.covariance.is_finite());
        assert!(state.covariance > 0.0 && state.covariance < DEFAULT_MEASUREMENT_NOISE);
    }

    #[test]
    fn test_states_are_independent_per_pattern_and_index() {
        let mut bank = FilterBank::default();
        bank.filter("a", 0, 1.0);
        bank.filter("a", 1, 0.0);
        bank.filter("b", 0, 0.5);
        assert_eq!(bank.state("a", 0).unwrap().estimate, 1.0);
        assert_eq!(bank.state("a", 1).unwrap().estimate, 0.0);
        assert_eq!(bank.state("b", 0).unwrap().estimate, 0.5);
        assert_eq!(bank.pattern_count(), 2);

        assert!(bank.remove_pattern("a"));
        assert!(bank.state("a", 0).is_none());
        assert!(!bank.remove_pattern("a"));
    }

    #[test]
    fn test_filter_vector_uses_index_order() {
        let mut bank = FilterBank::default();
        let out = bank.filter_vector("light", &FeatureVector::new(vec![0.25, 0.75]));
        assert_eq!(out.as_slice(), &[0.25, 0.75]);
        assert!(bank.state("light", 1).is_some());
    }

    #[test]
    fn test_fork_copies_one_pattern() {
        let mut bank = FilterBank::new(0.02, 0.2);
        bank.filter("kettle", 0, 0.3);
        bank.filter("washer", 0, 0.9);

        let mut forked = bank.fork(Some("kettle"));
        assert_eq!(forked.measurement_noise(), 0.02);
        assert_eq!(forked.pattern_count(), 1);
        assert_eq!(forked.state("kettle", 0), bank.state("kettle", 0));

        forked.filter("kettle", 0, 0.8);
        assert_ne!(forked.state("kettle", 0), bank.state("kettle", 0));
        assert_eq!(bank.fork(None).pattern_count(), 0);
    }
}
