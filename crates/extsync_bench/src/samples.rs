use std::collections::{BTreeMap, HashMap};
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One recorded invocation, flattened for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSample {
    pub source: String,
    pub function: String,
    pub launched: i64,
    pub completed: i64,
    pub runtime_ns: i64,
    pub remaining_workflow_len: usize,
    pub trial: i64,
    /// `completed` relative to the first launch of the same trial.
    pub net_completed: i64,
    pub params: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Runtime,
    NetCompleted,
}

impl Metric {
    pub fn value(self, sample: &BenchmarkSample) -> f64 {
        match self {
            Self::Runtime => sample.runtime_ns as f64,
            Self::NetCompleted => sample.net_completed as f64,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::NetCompleted => "net_completed",
        }
    }
}

impl BenchmarkSample {
    /// Looks up a grouping field: `function`, `trial`,
    /// `remaining_workflow_len`, or any extracted parameter.
    pub fn field(&self, name: &str) -> Option<GroupValue> {
        match name {
            "function" => Some(GroupValue::Text(self.function.clone())),
            "trial" => Some(GroupValue::Int(self.trial)),
            "remaining_workflow_len" => i64::try_from(self.remaining_workflow_len)
                .ok()
                .map(GroupValue::Int),
            _ => self.params.get(name).copied().map(GroupValue::Int),
        }
    }
}

/// Fills `net_completed` using the earliest launch among samples of the same
/// trial. A trial is identified by its trace file and trial number, since
/// trial numbers restart for every parameter point and a chain's args may
/// change between steps.
pub fn annotate_net_completed(samples: &mut [BenchmarkSample]) {
    let mut first_launch: HashMap<(&str, i64), i64> = HashMap::new();
    for sample in samples.iter() {
        first_launch
            .entry((sample.source.as_str(), sample.trial))
            .and_modify(|launched| *launched = (*launched).min(sample.launched))
            .or_insert(sample.launched);
    }
    let origins: Vec<i64> = samples
        .iter()
        .map(|sample| {
            first_launch
                .get(&(sample.source.as_str(), sample.trial))
                .copied()
                .unwrap_or(sample.launched)
        })
        .collect();
    for (sample, origin) in samples.iter_mut().zip(origins) {
        sample.net_completed = sample.completed.saturating_sub(origin);
    }
}

/// Deterministic order used everywhere samples are materialized.
pub fn sort_samples(samples: &mut [BenchmarkSample]) {
    samples.sort_by(|a, b| {
        (&a.params, a.trial, a.launched, &a.function, &a.source).cmp(&(
            &b.params,
            b.trial,
            b.launched,
            &b.function,
            &b.source,
        ))
    });
}
