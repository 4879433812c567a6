use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::samples::BenchmarkSample;
use crate::stats::mean;

/// Mean trial-relative completion of one function in a multi-step workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionLatency {
    pub function: String,
    pub samples: usize,
    pub mean_net_completed_ns: f64,
}

/// Per-function latency profile of one side, fastest function first.
pub fn function_latency_profile(samples: &[BenchmarkSample]) -> Vec<FunctionLatency> {
    let mut by_function: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        by_function
            .entry(sample.function.as_str())
            .or_default()
            .push(sample.net_completed as f64);
    }

    let mut profile: Vec<FunctionLatency> = by_function
        .into_iter()
        .filter_map(|(function, values)| {
            Some(FunctionLatency {
                function: function.to_string(),
                samples: values.len(),
                mean_net_completed_ns: mean(&values)?,
            })
        })
        .collect();
    profile.sort_by(|a, b| {
        a.mean_net_completed_ns
            .total_cmp(&b.mean_net_completed_ns)
            .then_with(|| a.function.cmp(&b.function))
    });
    profile
}
