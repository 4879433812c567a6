#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use extsync_bench::extract::{extract_dir, ExtractOptions, ExtractionReport};
use extsync_bench::samples::BenchmarkSample;
use extsync_core::contract::{normalize_plan, ExecutionPolicy, ExperimentPlan, NormalizedPlan};
use extsync_core::layout::trace_dir;

pub const SYNTHETIC_PATTERN: &str =
    "synthetic_{reps}reps_interop{interop_compute_ms}ms_trial{trial}";

/// Two chained synthetic steps, so the root's chain outlives its own
/// externalization by one full step.
pub fn chained_synthetic_plan(interop_ms: &[i64], trials: usize) -> NormalizedPlan {
    let plan: ExperimentPlan = serde_json::from_value(json!({
        "family": "synthetic",
        "workflow": ["synthetic", "synthetic"],
        "dimensions": {
            "reps": [1],
            "interop_compute_ms": interop_ms,
        },
        "trials": trials,
        "warmups": 1,
        "file_name_pattern": SYNTHETIC_PATTERN,
    }))
    .expect("plan should deserialize");
    normalize_plan(plan).expect("plan should normalize")
}

/// Loads a plan from the repository's `plans/` directory with its trial
/// count replaced.
pub fn bundled_plan(file_name: &str, trials: usize) -> NormalizedPlan {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../plans")
        .join(file_name);
    let content = fs::read_to_string(&path).expect("plan should be readable");
    let mut plan: Value = serde_json::from_str(&content).expect("plan should parse");
    plan["trials"] = json!(trials);
    let plan: ExperimentPlan = serde_json::from_value(plan).expect("plan should deserialize");
    normalize_plan(plan).expect("plan should normalize")
}

/// Samples grouped by trace file and trial.
pub fn samples_by_trial(
    samples: &[BenchmarkSample],
) -> BTreeMap<(String, i64), Vec<&BenchmarkSample>> {
    let mut trials: BTreeMap<(String, i64), Vec<&BenchmarkSample>> = BTreeMap::new();
    for sample in samples {
        trials
            .entry((sample.source.clone(), sample.trial))
            .or_default()
            .push(sample);
    }
    trials
}

pub fn extract_side(
    root: &Path,
    plan: &NormalizedPlan,
    policy: ExecutionPolicy,
) -> ExtractionReport {
    extract_dir(
        &trace_dir(root, &plan.family, policy),
        &ExtractOptions {
            grammar: Some(plan.file_name_pattern.clone()),
            show_progress: false,
        },
    )
    .expect("extraction should pass")
}
