use std::path::{Path, PathBuf};

use crate::contract::ExecutionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Traces,
    SampleCache,
    Comparison,
    LatencyProfile,
    RunContext,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::SampleCache => "samples",
            Self::Comparison => "comparison",
            Self::LatencyProfile => "latency_profile",
            Self::RunContext => "run_context",
        }
    }
}

pub const SINGLE_RECORD_EXTENSION: &str = "json";
pub const MULTI_RECORD_EXTENSION: &str = "ndjson";

pub fn family_dir(root: &Path, family: &str) -> PathBuf {
    root.join(family)
}

/// `<root>/<family>/<policy>`, the directory one benchmark side writes to.
pub fn trace_dir(root: &Path, family: &str, policy: ExecutionPolicy) -> PathBuf {
    family_dir(root, family).join(policy.as_str())
}

/// A trial holding one record is a single JSON object; longer chains are
/// written as newline-delimited JSON.
pub fn trace_file_path(
    root: &Path,
    family: &str,
    policy: ExecutionPolicy,
    stem: &str,
    record_count: usize,
) -> PathBuf {
    let extension = if record_count == 1 {
        SINGLE_RECORD_EXTENSION
    } else {
        MULTI_RECORD_EXTENSION
    };
    trace_dir(root, family, policy).join(format!("{stem}.{extension}"))
}

pub fn run_context_path(root: &Path, family: &str) -> PathBuf {
    family_dir(root, family).join(format!("{}.json", ArtifactKind::RunContext.as_str()))
}

pub fn is_run_context_file(path: &Path) -> bool {
    path.file_stem().and_then(|stem| stem.to_str()) == Some(ArtifactKind::RunContext.as_str())
}

pub fn sample_cache_path(cache_dir: &Path, family: &str, policy: ExecutionPolicy) -> PathBuf {
    cache_dir.join(format!(
        "{family}_{}_{}.csv",
        policy.as_str(),
        ArtifactKind::SampleCache.as_str()
    ))
}

pub fn report_path(output_dir: &Path, family: &str, kind: ArtifactKind, extension: &str) -> PathBuf {
    output_dir.join(format!("{family}_{}.{extension}", kind.as_str()))
}
