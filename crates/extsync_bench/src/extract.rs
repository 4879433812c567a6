//! Trace files to benchmark samples.
//!
//! A trace file holds either one JSON record or newline-delimited records.
//! The request envelope is read from `request.payload` when present and from
//! `request` itself otherwise. Records without `context.metadata.trial` are
//! warm-ups and are skipped before they reach any aggregate.
//!
//! With a grammar, a sample's parameters come from its file name. Args drift
//! as a chain runs, so every record of a trial file shares the file's values.
//!
//! Failure handling is asymmetric: a malformed record fails its file, which
//! is reported and skipped, while a file name that does not match the
//! family's grammar aborts the whole extraction.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use extsync_core::contract::TRIAL_FIELD;
use extsync_core::filename::{FileNameError, FileNameGrammar, FileNameParams};
use extsync_core::layout::is_run_context_file;

use crate::progress::progress_bar;
use crate::samples::{annotate_net_completed, sort_samples, BenchmarkSample};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot list trace directory {path}: {source}")]
    ReadDir { path: PathBuf, source: io::Error },
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("{path}: line {line}: invalid JSON: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("{path}: record {index}: missing or invalid field '{field}'")]
    Field {
        path: PathBuf,
        index: usize,
        field: &'static str,
    },
    #[error("{path}: record {index}: completed ({completed}) precedes launched ({launched})")]
    Timestamps {
        path: PathBuf,
        index: usize,
        launched: i64,
        completed: i64,
    },
    #[error("{path}: record {index}: trial {record_trial} does not match trial {file_trial} in the file name")]
    TrialMismatch {
        path: PathBuf,
        index: usize,
        file_trial: i64,
        record_trial: i64,
    },
    #[error(transparent)]
    FileName(#[from] FileNameError),
}

impl ExtractError {
    /// Whether the error must stop extraction of the whole corpus.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ReadDir { .. } | Self::FileName(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Parameter grammar of the family's file names. Without one, samples
    /// carry no parameters.
    pub grammar: Option<FileNameGrammar>,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileExtraction {
    pub samples: Vec<BenchmarkSample>,
    pub warmups_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    pub samples: Vec<BenchmarkSample>,
    pub files_read: usize,
    pub warmups_skipped: usize,
    pub failures: Vec<FileFailure>,
}

/// Extracts every trace file directly under `dir`.
pub fn extract_dir(dir: &Path, options: &ExtractOptions) -> Result<ExtractionReport, ExtractError> {
    let files = list_trace_files(dir)?;
    let progress = progress_bar(files.len(), options.show_progress);

    let outcomes: Vec<(PathBuf, Result<FileExtraction, ExtractError>)> = files
        .into_par_iter()
        .map(|path| {
            let outcome = extract_file(&path, options.grammar.as_ref());
            if let Some(bar) = &progress {
                bar.inc(1);
            }
            (path, outcome)
        })
        .collect();

    if let Some(bar) = &progress {
        bar.finish_with_message("Extracted");
    }

    let mut report = ExtractionReport::default();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(extraction) => {
                report.files_read += 1;
                report.warmups_skipped += extraction.warmups_skipped;
                report.samples.extend(extraction.samples);
            }
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "trace_file_skipped");
                report.failures.push(FileFailure {
                    path,
                    message: error.to_string(),
                });
            }
        }
    }

    annotate_net_completed(&mut report.samples);
    sort_samples(&mut report.samples);
    info!(
        dir = %dir.display(),
        files = report.files_read,
        samples = report.samples.len(),
        warmups_skipped = report.warmups_skipped,
        failed_files = report.failures.len(),
        "trace_extraction_completed"
    );
    Ok(report)
}

pub fn extract_file(
    path: &Path,
    grammar: Option<&FileNameGrammar>,
) -> Result<FileExtraction, ExtractError> {
    let content = fs::read_to_string(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    extract_records(path, &content, grammar)
}

/// Parses the contents of one trace file. `path` supplies the file name for
/// parameter extraction and error messages.
pub fn extract_records(
    path: &Path,
    content: &str,
    grammar: Option<&FileNameGrammar>,
) -> Result<FileExtraction, ExtractError> {
    let file_params = grammar
        .map(|grammar| grammar.extract_path(path))
        .transpose()?
        .unwrap_or_default();
    let file_trial = file_params.get(TRIAL_FIELD).copied();
    let params: FileNameParams = file_params
        .into_iter()
        .filter(|(label, _)| label != TRIAL_FIELD)
        .collect();
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut extraction = FileExtraction::default();
    for (index, record) in parse_documents(path, content)?.iter().enumerate() {
        let raw = RawRecord::parse(path, index, record)?;
        let Some(trial) = raw.trial else {
            extraction.warmups_skipped += 1;
            continue;
        };
        if let Some(file_trial) = file_trial.filter(|file_trial| *file_trial != trial) {
            return Err(ExtractError::TrialMismatch {
                path: path.to_path_buf(),
                index,
                file_trial,
                record_trial: trial,
            });
        }
        let Some(runtime_ns) = raw.completed.checked_sub(raw.launched) else {
            warn!(
                path = %path.display(),
                index,
                launched = raw.launched,
                completed = raw.completed,
                "record_runtime_overflow"
            );
            continue;
        };
        extraction.samples.push(BenchmarkSample {
            source: source.clone(),
            function: raw.function.to_string(),
            launched: raw.launched,
            completed: raw.completed,
            runtime_ns,
            remaining_workflow_len: raw.remaining_workflow_len,
            trial,
            net_completed: runtime_ns,
            params: params.clone(),
        });
    }
    Ok(extraction)
}

fn list_trace_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let read_dir_error = |source| ExtractError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_error)? {
        let path = entry.map_err(read_dir_error)?.path();
        let hidden = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(true);
        if path.is_file() && !hidden && !is_run_context_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn parse_documents(path: &Path, content: &str) -> Result<Vec<Value>, ExtractError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if let Ok(document) = serde_json::from_str::<Value>(trimmed) {
        return Ok(match document {
            Value::Array(records) => records,
            record => vec![record],
        });
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| ExtractError::Json {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })
        })
        .collect()
}

struct RawRecord<'a> {
    function: &'a str,
    launched: i64,
    completed: i64,
    remaining_workflow_len: usize,
    trial: Option<i64>,
}

impl<'a> RawRecord<'a> {
    fn parse(path: &Path, index: usize, record: &'a Value) -> Result<Self, ExtractError> {
        let field = |field: &'static str| ExtractError::Field {
            path: path.to_path_buf(),
            index,
            field,
        };
        let launched = record
            .get("launched")
            .and_then(Value::as_i64)
            .ok_or_else(|| field("launched"))?;
        let completed = record
            .get("completed")
            .and_then(Value::as_i64)
            .ok_or_else(|| field("completed"))?;
        let request = record
            .get("request")
            .filter(|request| request.is_object())
            .ok_or_else(|| field("request"))?;
        let function = request
            .get("function")
            .and_then(Value::as_str)
            .ok_or_else(|| field("request.function"))?;
        let envelope = request
            .get("payload")
            .filter(|payload| payload.is_object())
            .unwrap_or(request);
        let remaining_workflow_len = envelope
            .get("workflow")
            .and_then(Value::as_array)
            .map(Vec::len)
            .ok_or_else(|| field("workflow"))?;
        if envelope.get("args").is_some_and(|args| !args.is_object()) {
            return Err(field("args"));
        }
        if completed < launched {
            return Err(ExtractError::Timestamps {
                path: path.to_path_buf(),
                index,
                launched,
                completed,
            });
        }
        // Absent or null marks a warm-up; any other non-integer is malformed.
        let trial = match envelope
            .get("context")
            .and_then(|context| context.get("metadata"))
            .and_then(|metadata| metadata.get(TRIAL_FIELD))
        {
            None | Some(Value::Null) => None,
            Some(trial) => Some(
                trial
                    .as_i64()
                    .ok_or_else(|| field("context.metadata.trial"))?,
            ),
        };

        Ok(Self {
            function,
            launched,
            completed,
            remaining_workflow_len,
            trial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAMMAR: &str = "synthetic_{reps}reps_interop{interop_compute_ms}ms_trial{trial}";

    fn grammar() -> FileNameGrammar {
        FileNameGrammar::parse(GRAMMAR).expect("pattern should parse")
    }

    fn record(function: &str, launched: i64, completed: i64, trial: Option<i64>) -> String {
        let context = match trial {
            Some(trial) => format!(r#"{{"metadata":{{"trial":{trial}}},"time":1}}"#),
            None => r#"{"metadata":{},"time":1}"#.to_string(),
        };
        format!(
            r#"{{"launched":{launched},"completed":{completed},"request":{{"function":"{function}","payload":{{"args":{{}},"workflow":[],"context":{context}}}}}}}"#
        )
    }

    #[test]
    fn single_object_file_yields_one_sample_with_file_name_params() {
        let path = Path::new("synthetic_5reps_interop10ms_trial3.json");
        let content = record("synthetic", 100, 350, Some(3));

        let extraction =
            extract_records(path, &content, Some(&grammar())).expect("extraction should pass");

        assert_eq!(extraction.samples.len(), 1);
        let sample = &extraction.samples[0];
        assert_eq!(sample.runtime_ns, 250);
        assert_eq!(sample.trial, 3);
        assert_eq!(sample.params["reps"], 5);
        assert_eq!(sample.params["interop_compute_ms"], 10);
        assert!(!sample.params.contains_key("trial"));
    }

    #[test]
    fn ndjson_file_yields_one_sample_per_line_and_skips_warmups() {
        let content = [
            record("f1", 100, 200, Some(1)),
            String::new(),
            record("f2", 150, 260, Some(1)),
            record("f1", 10, 20, None),
        ]
        .join("\n");

        let extraction =
            extract_records(Path::new("trial1.ndjson"), &content, None).expect("extraction should pass");

        assert_eq!(extraction.samples.len(), 2);
        assert_eq!(extraction.warmups_skipped, 1);
        assert!(extraction.samples.iter().all(|sample| sample.params.is_empty()));
    }

    #[test]
    fn record_without_trial_is_excluded_regardless_of_other_fields() {
        let content = record("synthetic", 0, 999_999, None);

        let extraction = extract_records(
            Path::new("synthetic_5reps_interop10ms_trial3.json"),
            &content,
            Some(&grammar()),
        )
        .expect("extraction should pass");

        assert!(extraction.samples.is_empty());
        assert_eq!(extraction.warmups_skipped, 1);
    }

    #[test]
    fn flat_request_envelope_is_accepted() {
        let content = r#"{"launched":1,"completed":5,"request":{"function":"hello","args":{"reps":7,"interop_compute_ms":0},"workflow":["next"],"context":{"metadata":{"trial":2}}}}"#;

        let extraction = extract_records(
            Path::new("synthetic_1reps_interop0ms_trial2.json"),
            content,
            Some(&grammar()),
        )
        .expect("extraction should pass");

        let sample = &extraction.samples[0];
        assert_eq!(sample.function, "hello");
        assert_eq!(sample.remaining_workflow_len, 1);
    }

    #[test]
    fn file_name_parameters_win_over_drifting_args() {
        let first = r#"{"launched":10,"completed":20,"request":{"function":"f1","payload":{"args":{"reps":1},"workflow":["f2"],"context":{"metadata":{"trial":2}}}}}"#;
        let second = r#"{"launched":25,"completed":40,"request":{"function":"f2","payload":{"args":{"reps":2},"workflow":[],"context":{"metadata":{"trial":2}}}}}"#;
        let content = format!("{first}\n{second}");

        let extraction = extract_records(
            Path::new("synthetic_1reps_interop0ms_trial2.ndjson"),
            &content,
            Some(&grammar()),
        )
        .expect("extraction should pass");

        assert_eq!(extraction.samples.len(), 2);
        assert!(extraction
            .samples
            .iter()
            .all(|sample| sample.params["reps"] == 1 && sample.params["interop_compute_ms"] == 0));
    }

    #[test]
    fn non_integer_trial_is_a_file_level_error() {
        let content = r#"{"launched":1,"completed":5,"request":{"function":"f","payload":{"workflow":[],"context":{"metadata":{"trial":"1"}}}}}"#;

        let error = extract_records(Path::new("t.json"), content, None).expect_err("should fail");

        assert!(matches!(
            error,
            ExtractError::Field {
                field: "context.metadata.trial",
                ..
            }
        ));
        assert!(!error.is_fatal());
    }

    #[test]
    fn null_trial_is_a_warmup() {
        let content = r#"{"launched":1,"completed":5,"request":{"function":"f","payload":{"workflow":[],"context":{"metadata":{"trial":null}}}}}"#;

        let extraction =
            extract_records(Path::new("t.json"), content, None).expect("extraction should pass");

        assert!(extraction.samples.is_empty());
        assert_eq!(extraction.warmups_skipped, 1);
    }

    #[test]
    fn record_trial_must_match_the_file_name_trial() {
        let content = record("synthetic", 100, 200, Some(4));

        let error = extract_records(
            Path::new("synthetic_5reps_interop10ms_trial3.json"),
            &content,
            Some(&grammar()),
        )
        .expect_err("should fail");

        assert!(matches!(
            error,
            ExtractError::TrialMismatch {
                file_trial: 3,
                record_trial: 4,
                ..
            }
        ));
        assert!(!error.is_fatal());
    }

    #[test]
    fn runtime_overflow_skips_only_that_record() {
        let content = [
            record("f1", i64::MIN, i64::MAX, Some(1)),
            record("f2", 100, 250, Some(1)),
        ]
        .join("\n");

        let extraction =
            extract_records(Path::new("trial1.ndjson"), &content, None).expect("extraction should pass");

        assert_eq!(extraction.samples.len(), 1);
        assert_eq!(extraction.samples[0].function, "f2");
        assert_eq!(extraction.samples[0].runtime_ns, 150);
    }

    #[test]
    fn missing_timestamp_is_a_file_level_error() {
        let content = r#"{"completed":5,"request":{"function":"f","payload":{"workflow":[]}}}"#;

        let error = extract_records(Path::new("t.json"), content, None).expect_err("should fail");

        assert!(matches!(
            error,
            ExtractError::Field {
                field: "launched",
                ..
            }
        ));
        assert!(!error.is_fatal());
    }

    #[test]
    fn mismatched_file_name_is_fatal() {
        let content = record("synthetic", 1, 2, Some(1));

        let error = extract_records(Path::new("hello_trial1.json"), &content, Some(&grammar()))
            .expect_err("should fail");

        assert!(error.is_fatal());
    }

    #[test]
    fn extract_dir_skips_malformed_files_but_keeps_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(
            dir.path().join("synthetic_5reps_interop10ms_trial1.json"),
            record("synthetic", 100, 200, Some(1)),
        )
        .expect("write should pass");
        fs::write(
            dir.path().join("synthetic_5reps_interop10ms_trial2.json"),
            "{not json",
        )
        .expect("write should pass");
        fs::write(dir.path().join("run_context.json"), "{}").expect("write should pass");

        let report = extract_dir(
            dir.path(),
            &ExtractOptions {
                grammar: Some(grammar()),
                show_progress: false,
            },
        )
        .expect("extraction should pass");

        assert_eq!(report.files_read, 1);
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn extract_dir_aborts_on_grammar_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(
            dir.path().join("synthetic_5reps_trial1.json"),
            record("synthetic", 100, 200, Some(1)),
        )
        .expect("write should pass");

        let error = extract_dir(
            dir.path(),
            &ExtractOptions {
                grammar: Some(grammar()),
                show_progress: false,
            },
        )
        .expect_err("extraction should fail");

        assert!(matches!(error, ExtractError::FileName(_)));
    }
}
