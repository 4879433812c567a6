//! Paired percent-improvement comparison of two sample sets.
//!
//! Both sides are grouped by the group-key fields plus `trial`. Outliers are
//! rejected inside each group on each side independently, before the sides
//! are aligned. Only `(group key, trial)` tuples present on both sides after
//! rejection are paired; everything else is discarded, never imputed. The
//! result is a pure function of its inputs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::outliers::{OutlierReport, OutlierRule};
use crate::samples::{BenchmarkSample, GroupValue, Metric};
use crate::stats::{mean, sample_std_dev};

pub type GroupKey = Vec<(String, GroupValue)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Optimized,
    Baseline,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Self::Optimized => "optimized",
            Self::Baseline => "baseline",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CompareError {
    #[error("{} sample from {source_file} has no group-key field '{field}'", side.as_str())]
    MissingField {
        side: Side,
        field: String,
        source_file: String,
    },
    #[error("group-key field 'trial' is implicit and cannot be listed")]
    TrialInGroupKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompareOptions {
    pub group_key_fields: Vec<String>,
    pub metric: Metric,
    pub outlier_rule: OutlierRule,
}

impl CompareOptions {
    pub fn new<I, S>(group_key_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group_key_fields: group_key_fields.into_iter().map(Into::into).collect(),
            metric: Metric::default(),
            outlier_rule: OutlierRule::default(),
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_outlier_rule(mut self, outlier_rule: OutlierRule) -> Self {
        self.outlier_rule = outlier_rule;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub key: GroupKey,
    pub paired_trials: usize,
    pub mean_pct_improvement: f64,
    /// Absent when only one trial was paired.
    pub std_pct_improvement: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub group_key_fields: Vec<String>,
    pub metric: Metric,
    pub rows: Vec<ComparisonRow>,
    /// Group keys seen on either side that produced no paired trial.
    pub unmatched_keys: Vec<GroupKey>,
    pub optimized_outliers: OutlierReport,
    pub baseline_outliers: OutlierReport,
}

impl ComparisonResult {
    pub fn row(&self, key: &GroupKey) -> Option<&ComparisonRow> {
        self.rows.iter().find(|row| &row.key == key)
    }
}

type TrialKey = (GroupKey, i64);

pub fn compare(
    optimized: &[BenchmarkSample],
    baseline: &[BenchmarkSample],
    options: &CompareOptions,
) -> Result<ComparisonResult, CompareError> {
    if options
        .group_key_fields
        .iter()
        .any(|field| field == extsync_core::contract::TRIAL_FIELD)
    {
        return Err(CompareError::TrialInGroupKey);
    }

    let optimized_groups = group(Side::Optimized, optimized, options)?;
    let baseline_groups = group(Side::Baseline, baseline, options)?;

    let ((optimized_values, optimized_outliers), (baseline_values, baseline_outliers)) =
        rayon::join(
            || reject(&optimized_groups, &options.outlier_rule),
            || reject(&baseline_groups, &options.outlier_rule),
        );

    let mut improvements: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for ((key, trial), baseline_value) in &baseline_values {
        let Some(optimized_value) = optimized_values.get(&(key.clone(), *trial)) else {
            continue;
        };
        if *baseline_value == 0.0 {
            warn!(key = ?key, trial, "skipping pair with zero baseline");
            continue;
        }
        improvements
            .entry(key.clone())
            .or_default()
            .push((baseline_value - optimized_value) / baseline_value * 100.0);
    }

    let rows: Vec<ComparisonRow> = improvements
        .into_iter()
        .filter_map(|(key, values)| {
            Some(ComparisonRow {
                paired_trials: values.len(),
                mean_pct_improvement: mean(&values)?,
                std_pct_improvement: sample_std_dev(&values),
                key,
            })
        })
        .collect();

    let paired: BTreeSet<&GroupKey> = rows.iter().map(|row| &row.key).collect();
    let unmatched_keys: Vec<GroupKey> = optimized_groups
        .keys()
        .chain(baseline_groups.keys())
        .map(|(key, _)| key)
        .filter(|key| !paired.contains(key))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect();
    for key in &unmatched_keys {
        debug!(key = ?key, "group key has no paired trial");
    }

    Ok(ComparisonResult {
        group_key_fields: options.group_key_fields.clone(),
        metric: options.metric,
        rows,
        unmatched_keys,
        optimized_outliers,
        baseline_outliers,
    })
}

fn group(
    side: Side,
    samples: &[BenchmarkSample],
    options: &CompareOptions,
) -> Result<BTreeMap<TrialKey, Vec<f64>>, CompareError> {
    let mut groups: BTreeMap<TrialKey, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        let key = options
            .group_key_fields
            .iter()
            .map(|field| {
                sample
                    .field(field)
                    .map(|value| (field.clone(), value))
                    .ok_or_else(|| CompareError::MissingField {
                        side,
                        field: field.clone(),
                        source_file: sample.source.clone(),
                    })
            })
            .collect::<Result<GroupKey, _>>()?;
        groups
            .entry((key, sample.trial))
            .or_default()
            .push(options.metric.value(sample));
    }
    Ok(groups)
}

// One value per surviving tuple: the mean of the group's retained samples.
fn reject(
    groups: &BTreeMap<TrialKey, Vec<f64>>,
    rule: &OutlierRule,
) -> (BTreeMap<TrialKey, f64>, OutlierReport) {
    let mut report = OutlierReport::default();
    let mut values = BTreeMap::new();
    for (key, group) in groups {
        let (kept, dropped) = rule.retain(group);
        report.absorb(group.len(), dropped);
        if let Some(value) = mean(&kept) {
            values.insert(key.clone(), value);
        }
    }
    (values, report)
}
