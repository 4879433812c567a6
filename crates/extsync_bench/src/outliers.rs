use serde::{Deserialize, Serialize};

use crate::stats::{percentile, sorted};

pub const DEFAULT_LOWER_PERCENTILE: f64 = 10.0;
pub const DEFAULT_UPPER_PERCENTILE: f64 = 90.0;
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Inter-percentile range fence: values outside
/// `[p_lo − k·(p_hi − p_lo), p_hi + k·(p_hi − p_lo)]` are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierRule {
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub multiplier: f64,
}

impl Default for OutlierRule {
    fn default() -> Self {
        Self {
            lower_percentile: DEFAULT_LOWER_PERCENTILE,
            upper_percentile: DEFAULT_UPPER_PERCENTILE,
            multiplier: DEFAULT_IQR_MULTIPLIER,
        }
    }
}

impl OutlierRule {
    pub fn with_multiplier(multiplier: f64) -> Self {
        Self {
            multiplier,
            ..Self::default()
        }
    }

    pub fn bounds(&self, values: &[f64]) -> Option<(f64, f64)> {
        let ordered = sorted(values);
        let low = percentile(&ordered, self.lower_percentile)?;
        let high = percentile(&ordered, self.upper_percentile)?;
        let width = (high - low) * self.multiplier;
        Some((low - width, high + width))
    }

    /// Returns the surviving values in input order and how many were dropped.
    pub fn retain(&self, values: &[f64]) -> (Vec<f64>, usize) {
        let Some((lower, upper)) = self.bounds(values) else {
            return (Vec::new(), 0);
        };
        let kept: Vec<f64> = values
            .iter()
            .copied()
            .filter(|value| *value >= lower && *value <= upper)
            .collect();
        let dropped = values.len() - kept.len();
        (kept, dropped)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlierReport {
    pub groups: usize,
    pub examined: usize,
    pub dropped: usize,
    pub max_dropped_in_group: usize,
}

impl OutlierReport {
    pub fn absorb(&mut self, examined: usize, dropped: usize) {
        self.groups += 1;
        self.examined += examined;
        self.dropped += dropped;
        self.max_dropped_in_group = self.max_dropped_in_group.max(dropped);
    }
}
