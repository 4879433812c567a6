//! Summary statistics over latency samples.
//!
//! Percentiles interpolate linearly between closest ranks, so `p10`/`p90`
//! of small groups are stable under reordering of the input.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub std_dev: Option<f64>,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n − 1); undefined below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// `percentile` in `[0, 100]` of an ascending slice.
pub fn percentile(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

pub fn summarize(values: &[f64]) -> Option<LatencySummary> {
    let ordered = sorted(values);
    Some(LatencySummary {
        count: values.len(),
        mean: mean(values)?,
        median: percentile(&ordered, 50.0)?,
        p90: percentile(&ordered, 90.0)?,
        std_dev: sample_std_dev(values),
    })
}
