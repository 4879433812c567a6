//! Runs an experiment plan on the in-process host.
//!
//! For every policy and parameter point the runner builds a fresh store and
//! host, discards the warm-up invocations, then submits one chain per trial
//! and writes that trial's records to
//! `<root>/<family>/<policy>/<rendered file name>`. A trial whose chain fails
//! is counted and logged; its records are discarded.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use extsync_core::contract::{
    experiment_context, plan_fingerprint, Args, ExecutionPolicy, NormalizedPlan, RunContext,
    ValidationError, WorkflowEnvelope, TRACE_RECORD_SCHEMA_VERSION,
};
use extsync_core::filename::FileNameError;
use extsync_core::grid::{compute_parameter_points, ParameterPoint};
use extsync_core::layout::{run_context_path, trace_file_path};
use extsync_core::workloads;
use extsync_host::adapters::kv_store::{DelayedKv, InMemoryKv, KvStore};
use extsync_host::host::{HostConfig, HostError, LocalHost};
use extsync_host::trace::{write_trace_file, MemoryTraceSink};

use crate::progress::progress_bar;
use crate::stats::{summarize, LatencySummary};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid plan: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    FileName(#[from] FileNameError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("unknown workflow function '{0}'")]
    UnknownFunction(String),
    #[error("cannot write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot write trace file {path}: {message}")]
    Trace { path: PathBuf, message: String },
    #[error("cannot encode run context: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub trace_root: PathBuf,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn new(trace_root: impl Into<PathBuf>) -> Self {
        Self {
            trace_root: trace_root.into(),
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub family: String,
    pub plan_fingerprint: String,
    pub files_written: Vec<PathBuf>,
    pub trials_run: usize,
    pub failed_trials: usize,
    /// Latency observed by the original caller, per policy.
    pub caller_latency: BTreeMap<ExecutionPolicy, LatencySummary>,
}

/// Runs every policy, point and trial of `plan`. Must be called inside a
/// multi-threaded tokio runtime.
pub async fn run_plan(plan: &NormalizedPlan, options: &RunOptions) -> Result<RunSummary, RunError> {
    let registry = workloads::bundled_registry();
    if let Some(unknown) = std::iter::once(&plan.entry_function)
        .chain(&plan.continuation)
        .find(|function| !registry.contains(function))
    {
        return Err(RunError::UnknownFunction(unknown.clone()));
    }
    let points = compute_parameter_points(plan)?;
    let fingerprint = plan_fingerprint(plan);
    write_run_context(plan, &fingerprint, &options.trace_root)?;

    let total = plan.policies.len() * points.len() * plan.trials;
    let progress = progress_bar(total, options.show_progress);
    let mut summary = RunSummary {
        family: plan.family.clone(),
        plan_fingerprint: fingerprint,
        files_written: Vec::new(),
        trials_run: 0,
        failed_trials: 0,
        caller_latency: BTreeMap::new(),
    };

    for &policy in &plan.policies {
        let mut latencies = Vec::new();
        for point in &points {
            let sink = Arc::new(MemoryTraceSink::new());
            let host = LocalHost::new(
                registry.clone(),
                point_store(plan, point),
                sink.clone(),
                HostConfig::new(policy).with_key_scope(plan.key_scope),
            )?;

            for _ in 0..plan.warmups {
                if let Err(error) = run_chain(&host, plan, point, None).await {
                    warn!(policy = %policy, point = point.index, error = %error, "warmup_failed");
                }
            }
            sink.drain();

            for trial in 1..=plan.trials as i64 {
                summary.trials_run += 1;
                match run_chain(&host, plan, point, Some(trial)).await {
                    Ok(latency_ns) => {
                        let records = sink.drain();
                        let stem = plan.file_name_pattern.render(&point.with_trial(trial))?;
                        let path = trace_file_path(
                            &options.trace_root,
                            &plan.family,
                            policy,
                            &stem,
                            records.len(),
                        );
                        write_trace_file(&path, &records).map_err(|error| RunError::Trace {
                            path: path.clone(),
                            message: error.to_string(),
                        })?;
                        latencies.push(latency_ns as f64);
                        summary.files_written.push(path);
                    }
                    Err(error) => {
                        sink.drain();
                        summary.failed_trials += 1;
                        warn!(
                            policy = %policy,
                            point = point.index,
                            trial,
                            error = %error,
                            "trial_failed"
                        );
                    }
                }
                if let Some(bar) = &progress {
                    bar.inc(1);
                }
            }
        }
        if let Some(latency) = summarize(&latencies) {
            info!(
                policy = %policy,
                trials = latency.count,
                mean_ns = latency.mean,
                p90_ns = latency.p90,
                "policy_completed"
            );
            summary.caller_latency.insert(policy, latency);
        }
    }

    if let Some(bar) = &progress {
        bar.finish_with_message("Completed");
    }
    info!(
        family = %summary.family,
        files = summary.files_written.len(),
        failed_trials = summary.failed_trials,
        "plan_completed"
    );
    Ok(summary)
}

/// Submits one chain and waits for all of it; returns the caller's latency.
async fn run_chain(
    host: &LocalHost,
    plan: &NormalizedPlan,
    point: &ParameterPoint,
    trial: Option<i64>,
) -> Result<i64, HostError> {
    let envelope = WorkflowEnvelope::new(
        point_args(plan, point),
        plan.continuation.iter().cloned(),
        experiment_context(trial, Utc::now().timestamp_millis()),
    );
    let submission = host.submit(&plan.entry_function, envelope).await?;
    let latency_ns = submission.response.latency_ns();
    submission.wait_chain().await?;
    Ok(latency_ns)
}

fn point_args(plan: &NormalizedPlan, point: &ParameterPoint) -> Args {
    let mut args = plan.fixed_args.clone();
    for (name, value) in &point.values {
        args.insert(name.clone(), Value::from(*value));
    }
    args
}

fn point_store(plan: &NormalizedPlan, point: &ParameterPoint) -> Arc<dyn KvStore> {
    let delay_ms = plan
        .store_latency_dimension
        .as_ref()
        .and_then(|dimension| point.values.get(dimension))
        .and_then(|value| u64::try_from(*value).ok())
        .unwrap_or(0);
    if delay_ms == 0 {
        Arc::new(InMemoryKv::new())
    } else {
        Arc::new(DelayedKv::new(
            InMemoryKv::new(),
            Duration::from_millis(delay_ms),
        ))
    }
}

fn write_run_context(plan: &NormalizedPlan, fingerprint: &str, root: &Path) -> Result<(), RunError> {
    let context = RunContext {
        family: plan.family.clone(),
        schema_version: TRACE_RECORD_SCHEMA_VERSION.to_string(),
        plan_fingerprint: fingerprint.to_string(),
        started_at: Utc::now().to_rfc3339(),
        policies: plan.policies.clone(),
    };
    let path = run_context_path(root, &plan.family);
    let io_error = |source| RunError::Io {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(&path, serde_json::to_string_pretty(&context)?).map_err(io_error)?;
    Ok(())
}
