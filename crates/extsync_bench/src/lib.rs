//! Benchmark driver and statistical pipeline for external synchrony.
//!
//! The crate runs experiment plans on the in-process host, turns the
//! resulting trace files into structured samples, and compares a baseline
//! side against an external-synchrony side with paired, outlier-rejected
//! percent improvement.
//!
//! # Quick Start
//!
//! ```no_run
//! use extsync_bench::compare::{compare, CompareOptions};
//! use extsync_bench::extract::{extract_dir, ExtractOptions};
//!
//! let options = ExtractOptions::default();
//! let baseline = extract_dir("traces/synthetic/baseline".as_ref(), &options).unwrap();
//! let optimized = extract_dir("traces/synthetic/ext_sync".as_ref(), &options).unwrap();
//!
//! let result = compare(
//!     &optimized.samples,
//!     &baseline.samples,
//!     &CompareOptions::new(["reps", "interop_compute_ms"]),
//! )
//! .unwrap();
//! for row in &result.rows {
//!     println!("{:?} {:.1}%", row.key, row.mean_pct_improvement);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`runner`]: executes a plan under each policy and writes trace files
//! - [`extract`]: trace files to [`samples::BenchmarkSample`]s, in parallel
//! - [`cache`]: CSV sample cache that is transparent to comparison
//! - [`outliers`] and [`stats`]: IQR rejection and summary statistics
//! - [`compare`]: paired percent improvement per group key
//! - [`profile`]: per-function latency profile of multi-step workflows
//! - [`theoretical`]: the analytic model of the achievable improvement
//! - [`export`]: CSV/JSON reports

pub mod cache;
pub mod compare;
pub mod export;
pub mod extract;
pub mod outliers;
pub mod profile;
mod progress;
pub mod runner;
pub mod samples;
pub mod stats;
pub mod theoretical;

pub use compare::{compare, CompareOptions, ComparisonResult};
pub use extract::{extract_dir, ExtractOptions, ExtractionReport};
pub use runner::{run_plan, RunOptions, RunSummary};
pub use samples::{BenchmarkSample, Metric};
