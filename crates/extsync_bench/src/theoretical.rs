//! Analytic bound on the improvement external synchrony can deliver.
//!
//! A step that computes for `x` and then waits `w` on a durable write costs
//! the caller `x + w` under baseline. Releasing the caller at the
//! externalization point overlaps the two, leaving `max(x, w)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TheoreticalPoint {
    pub execution_time: f64,
    pub write_time: f64,
    pub baseline: f64,
    pub ext_sync: f64,
    pub pct_improvement: f64,
}

pub fn theoretical_point(execution_time: f64, write_time: f64) -> TheoreticalPoint {
    let baseline = execution_time + write_time;
    let ext_sync = execution_time.max(write_time);
    let pct_improvement = if baseline > 0.0 {
        (baseline - ext_sync) / baseline * 100.0
    } else {
        0.0
    };
    TheoreticalPoint {
        execution_time,
        write_time,
        baseline,
        ext_sync,
        pct_improvement,
    }
}

pub fn theoretical_curve(
    execution_times: impl IntoIterator<Item = f64>,
    write_time: f64,
) -> Vec<TheoreticalPoint> {
    execution_times
        .into_iter()
        .map(|execution_time| theoretical_point(execution_time, write_time))
        .collect()
}

/// `0, step, 2·step, ..` up to and including `max` when it falls on the grid.
pub fn execution_range(max: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || max < 0.0 {
        return Vec::new();
    }
    let count = (max / step).floor() as usize;
    (0..=count).map(|index| index as f64 * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_peaks_when_execution_matches_write_time() {
        let curve = theoretical_curve(execution_range(200.0, 50.0), 100.0);

        let improvements: Vec<f64> = curve.iter().map(|point| point.pct_improvement).collect();
        assert_eq!(curve.len(), 5);
        assert_eq!(improvements[0], 0.0);
        assert_eq!(improvements[2], 50.0);
        assert!(improvements[1] < improvements[2]);
        assert!(improvements[3] < improvements[2]);
    }

    #[test]
    fn zero_cost_step_has_no_improvement() {
        let point = theoretical_point(0.0, 0.0);

        assert_eq!(point.baseline, 0.0);
        assert_eq!(point.pct_improvement, 0.0);
        assert!(execution_range(10.0, 0.0).is_empty());
    }
}
