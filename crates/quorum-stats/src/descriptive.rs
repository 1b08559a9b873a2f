//! Running aggregates and normalization helpers.

use serde::{Deserialize, Serialize};

/// Incrementally maintained mean/variance using Welford's algorithm.
///
/// Designed for append-only metric streams: each observation updates the
/// aggregate in O(1) and no history rescans are ever needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    /// Number of observations.
    count: u64,
    /// Running mean.
    mean: f64,
    /// Sum of squared deviations from the mean (Welford's M2).
    m2: f64,
}

impl RunningStats {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one observation to the aggregate.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Merges another aggregate into this one (Chan's parallel update).
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let total = self.count + other.count;
        let delta = other.mean - self.mean;
        self.mean += delta * other.count as f64 / total as f64;
        self.m2 += other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / total as f64;
        self.count = total;
    }

    /// Number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, or 0.0 with no observations.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n - 1 denominator), 0.0 below two observations.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / (self.count - 1) as f64
    }

    /// Sample standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Min-max normalizes a slice into [0, 1].
///
/// A degenerate input (all values equal, or empty) maps every entry to
/// 0.5 so downstream composite scores stay comparable.
#[must_use]
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range < f64::EPSILON {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welford_matches_arithmetic_mean() {
        let samples = [4.0, 7.0, 13.0, 16.0];
        let mut stats = RunningStats::new();
        for s in samples {
            stats.push(s);
        }

        assert_eq!(stats.count(), 4);
        assert!((stats.mean() - 10.0).abs() < 1e-12);
        // Sample variance of [4, 7, 13, 16] is 30.
        assert!((stats.variance() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stats_are_zeroed() {
        let stats = RunningStats::new();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.variance(), 0.0);
    }

    #[test]
    fn test_merge_equals_sequential_push() {
        let mut left = RunningStats::new();
        let mut right = RunningStats::new();
        let mut all = RunningStats::new();

        for s in [1.0, 2.0, 3.0] {
            left.push(s);
            all.push(s);
        }
        for s in [10.0, 20.0, 30.0, 40.0] {
            right.push(s);
            all.push(s);
        }

        left.merge(&right);
        assert_eq!(left.count(), all.count());
        assert!((left.mean() - all.mean()).abs() < 1e-9);
        assert!((left.variance() - all.variance()).abs() < 1e-9);
    }

    #[test]
    fn test_running_stats_serde_round_trip() {
        let mut stats = RunningStats::new();
        for s in [2.0, 4.0, 9.0] {
            stats.push(s);
        }

        let json = serde_json::to_string(&stats).unwrap();
        let back: RunningStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
        assert_eq!(back.count(), 3);
        assert!((back.variance() - stats.variance()).abs() < 1e-12);
    }

    #[test]
    fn test_min_max_normalize() {
        let normalized = min_max_normalize(&[10.0, 20.0, 30.0]);
        assert_eq!(normalized, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_min_max_normalize_constant_input() {
        let normalized = min_max_normalize(&[5.0, 5.0, 5.0]);
        assert_eq!(normalized, vec![0.5, 0.5, 0.5]);
    }
}
