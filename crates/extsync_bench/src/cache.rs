//! Flat CSV cache of extracted samples.
//!
//! Fixed columns come first, then one `param.<name>` column per parameter
//! seen in the sample set. An empty parameter cell means the sample does not
//! carry that parameter. Every sample field is a string or an integer, so a
//! load reproduces the extracted samples exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::extract::ExtractError;
use crate::samples::{sort_samples, BenchmarkSample};

const PARAM_PREFIX: &str = "param.";
const FIXED_COLUMNS: [&str; 8] = [
    "source",
    "function",
    "launched",
    "completed",
    "runtime_ns",
    "remaining_workflow_len",
    "trial",
    "net_completed",
];

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cache {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("cache {path}: row {row}: {message}")]
    Malformed {
        path: PathBuf,
        row: usize,
        message: String,
    },
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheLoad {
    pub samples: Vec<BenchmarkSample>,
    pub from_cache: bool,
}

/// Returns the cached samples at `path`, or runs `extract` and caches its
/// output when no cache exists yet.
pub fn load_or_extract<F>(path: &Path, extract: F) -> Result<CacheLoad, CacheError>
where
    F: FnOnce() -> Result<Vec<BenchmarkSample>, ExtractError>,
{
    if path.is_file() {
        let samples = read_samples(path)?;
        info!(path = %path.display(), samples = samples.len(), "sample_cache_hit");
        return Ok(CacheLoad {
            samples,
            from_cache: true,
        });
    }

    let samples = extract()?;
    write_samples(path, &samples)?;
    info!(path = %path.display(), samples = samples.len(), "sample_cache_written");
    Ok(CacheLoad {
        samples,
        from_cache: false,
    })
}

pub fn write_samples(path: &Path, samples: &[BenchmarkSample]) -> Result<(), CacheError> {
    let io_error = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_error = |source| CacheError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let param_names: BTreeSet<&str> = samples
        .iter()
        .flat_map(|sample| sample.params.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
    let header: Vec<String> = FIXED_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .chain(param_names.iter().map(|name| format!("{PARAM_PREFIX}{name}")))
        .collect();
    wtr.write_record(&header).map_err(csv_error)?;

    for sample in samples {
        let mut row = vec![
            sample.source.clone(),
            sample.function.clone(),
            sample.launched.to_string(),
            sample.completed.to_string(),
            sample.runtime_ns.to_string(),
            sample.remaining_workflow_len.to_string(),
            sample.trial.to_string(),
            sample.net_completed.to_string(),
        ];
        row.extend(param_names.iter().map(|name| {
            sample
                .params
                .get(*name)
                .map(ToString::to_string)
                .unwrap_or_default()
        }));
        wtr.write_record(&row).map_err(csv_error)?;
    }
    wtr.flush().map_err(io_error)?;
    Ok(())
}

pub fn read_samples(path: &Path) -> Result<Vec<BenchmarkSample>, CacheError> {
    let csv_error = |source| CacheError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::Reader::from_path(path).map_err(csv_error)?;
    let headers = rdr.headers().map_err(csv_error)?.clone();

    let fixed: Vec<&str> = headers.iter().take(FIXED_COLUMNS.len()).collect();
    if fixed != FIXED_COLUMNS {
        return Err(CacheError::Malformed {
            path: path.to_path_buf(),
            row: 0,
            message: format!("unexpected header {fixed:?}"),
        });
    }
    let mut param_names = Vec::new();
    for column in headers.iter().skip(FIXED_COLUMNS.len()) {
        let name = column
            .strip_prefix(PARAM_PREFIX)
            .ok_or_else(|| CacheError::Malformed {
                path: path.to_path_buf(),
                row: 0,
                message: format!("unexpected column '{column}'"),
            })?;
        param_names.push(name.to_string());
    }

    let mut samples = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let row = index + 1;
        let cell = |column: usize| record.get(column).unwrap_or_default();
        let int = |column: usize| -> Result<i64, CacheError> {
            cell(column)
                .parse::<i64>()
                .map_err(|error| CacheError::Malformed {
                    path: path.to_path_buf(),
                    row,
                    message: format!("column '{}': {error}", FIXED_COLUMNS[column]),
                })
        };

        let remaining_workflow_len =
            usize::try_from(int(5)?).map_err(|error| CacheError::Malformed {
                path: path.to_path_buf(),
                row,
                message: format!("column 'remaining_workflow_len': {error}"),
            })?;
        let mut params = BTreeMap::new();
        for (offset, name) in param_names.iter().enumerate() {
            let raw = cell(FIXED_COLUMNS.len() + offset);
            if raw.is_empty() {
                continue;
            }
            let value = raw.parse::<i64>().map_err(|error| CacheError::Malformed {
                path: path.to_path_buf(),
                row,
                message: format!("column '{PARAM_PREFIX}{name}': {error}"),
            })?;
            params.insert(name.clone(), value);
        }

        samples.push(BenchmarkSample {
            source: cell(0).to_string(),
            function: cell(1).to_string(),
            launched: int(2)?,
            completed: int(3)?,
            runtime_ns: int(4)?,
            remaining_workflow_len,
            trial: int(6)?,
            net_completed: int(7)?,
            params,
        });
    }
    sort_samples(&mut samples);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::samples::fixtures::sample;

    #[test]
    fn round_trip_reproduces_samples_exactly() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("cache").join("synthetic_baseline_samples.csv");
        let mut with_comma = sample(&[("reps", 5), ("interop_compute_ms", 10)], 1, 120);
        with_comma.source = "odd,name \"quoted\".json".to_string();
        let mut samples = vec![
            with_comma,
            sample(&[("reps", 5), ("interop_compute_ms", 10)], 2, 130),
            sample(&[("reps", 7)], 1, 90),
        ];
        sort_samples(&mut samples);

        write_samples(&path, &samples).expect("write should pass");
        let loaded = read_samples(&path).expect("read should pass");

        assert_eq!(loaded, samples);
    }

    #[test]
    fn load_or_extract_only_extracts_once() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("samples.csv");
        let calls = Cell::new(0);
        let extract = || {
            calls.set(calls.get() + 1);
            Ok(vec![sample(&[("reps", 1)], 1, 10)])
        };

        let first = load_or_extract(&path, extract).expect("first load should pass");
        let second = load_or_extract(&path, || {
            calls.set(calls.get() + 1);
            Ok(Vec::new())
        })
        .expect("second load should pass");

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.samples, second.samples);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn non_integer_cell_is_reported_with_its_row() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("samples.csv");
        fs::write(
            &path,
            "source,function,launched,completed,runtime_ns,remaining_workflow_len,trial,net_completed\n\
             a.json,f,1,2,x,0,1,1\n",
        )
        .expect("write should pass");

        let error = read_samples(&path).expect_err("read should fail");

        assert!(matches!(error, CacheError::Malformed { row: 1, .. }));
    }
}
