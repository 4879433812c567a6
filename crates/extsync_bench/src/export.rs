//! Report export.
//!
//! Comparison tables go to CSV and JSON; latency profiles and the theoretical
//! curve go to CSV. Sample sets are written by [`crate::cache`].

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::compare::ComparisonResult;
use crate::profile::FunctionLatency;
use crate::theoretical::TheoreticalPoint;

#[path = "export/csv.rs"]
mod csv;
#[path = "export/json.rs"]
mod json;
#[path = "export/writer_utils.rs"]
mod writer_utils;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export to {0}")]
    Empty(PathBuf),
    #[error("cannot write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot write {path}: {source}")]
    Csv {
        path: PathBuf,
        source: ::csv::Error,
    },
    #[error("cannot write {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Writes one row per group key: the key fields, the paired trial count,
/// `mean_pct_improvement`, `std_pct_improvement` and both sides' outlier
/// diagnostics.
///
/// # Errors
///
/// Fails when the comparison has no rows or the file cannot be written.
pub fn export_comparison_csv(
    result: &ComparisonResult,
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    writer_utils::ensure_not_empty(&result.rows, path)?;
    let file = writer_utils::create_output_file(path)?;
    csv::export_comparison_csv_impl(result, file).map_err(|source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the whole comparison result, including unmatched keys, as pretty
/// JSON. An empty result is still written.
pub fn export_comparison_json(
    result: &ComparisonResult,
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    let file = writer_utils::create_output_file(path)?;
    json::export_to_json_impl(result, file).map_err(|source| ExportError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn export_profile_csv(
    profile: &[FunctionLatency],
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    writer_utils::ensure_not_empty(profile, path)?;
    let file = writer_utils::create_output_file(path)?;
    csv::export_profile_csv_impl(profile, file).map_err(|source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

pub fn export_theoretical_csv(
    curve: &[TheoreticalPoint],
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    writer_utils::ensure_not_empty(curve, path)?;
    let file = writer_utils::create_output_file(path)?;
    csv::export_theoretical_csv_impl(curve, file).map_err(|source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::compare::{compare, CompareOptions};
    use crate::samples::fixtures::sample;
    use crate::theoretical::{execution_range, theoretical_curve};

    fn comparison() -> ComparisonResult {
        let baseline = vec![
            sample(&[("reps", 5)], 1, 120),
            sample(&[("reps", 5)], 2, 130),
        ];
        let optimized = vec![sample(&[("reps", 5)], 1, 60), sample(&[("reps", 5)], 2, 65)];
        compare(&optimized, &baseline, &CompareOptions::new(["reps"])).expect("compare should pass")
    }

    #[test]
    fn comparison_csv_has_key_and_improvement_columns() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("nested").join("synthetic_comparison.csv");

        export_comparison_csv(&comparison(), &path).expect("export should pass");

        let content = fs::read_to_string(&path).expect("read should pass");
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some(
                "reps,paired_trials,mean_pct_improvement,std_pct_improvement,\
                 optimized_outliers_dropped,baseline_outliers_dropped,max_dropped_in_group"
            )
        );
        assert_eq!(lines.next(), Some("5,2,50,0,0,0,0"));
    }

    #[test]
    fn comparison_json_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("synthetic_comparison.json");
        let result = comparison();

        export_comparison_json(&result, &path).expect("export should pass");

        let content = fs::read_to_string(&path).expect("read should pass");
        let parsed: ComparisonResult = serde_json::from_str(&content).expect("json should parse");
        assert_eq!(parsed, result);
    }

    #[test]
    fn empty_tables_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir should be created");

        let error = export_profile_csv(&[], dir.path().join("profile.csv"))
            .expect_err("export should fail");
        assert!(matches!(error, ExportError::Empty(_)));

        export_theoretical_csv(
            &theoretical_curve(execution_range(100.0, 25.0), 50.0),
            dir.path().join("theoretical.csv"),
        )
        .expect("export should pass");
    }
}
