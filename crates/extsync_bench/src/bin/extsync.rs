use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use extsync_bench::cache::load_or_extract;
use extsync_bench::compare::{compare, CompareOptions, ComparisonResult};
use extsync_bench::export::{
    export_comparison_csv, export_comparison_json, export_profile_csv, export_theoretical_csv,
};
use extsync_bench::extract::{extract_dir, ExtractError, ExtractOptions};
use extsync_bench::outliers::{OutlierRule, DEFAULT_IQR_MULTIPLIER};
use extsync_bench::profile::function_latency_profile;
use extsync_bench::runner::{run_plan, RunOptions};
use extsync_bench::samples::{BenchmarkSample, Metric};
use extsync_bench::theoretical::{execution_range, theoretical_curve};
use extsync_core::contract::{
    normalize_plan, ExecutionPolicy, ExperimentPlan, NormalizedPlan, TRIAL_FIELD,
};
use extsync_core::filename::FileNameGrammar;
use extsync_core::layout::{report_path, sample_cache_path, trace_dir, ArtifactKind};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "extsync",
    about = "Workflow-chaining benchmarks for external synchrony",
    long_about = "Runs experiment plans under the baseline and external-synchrony\n\
                  policies, extracts the trace files, and compares the two sides."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment plan and write trace files
    Run {
        /// Plan file (JSON)
        #[arg(long)]
        plan: PathBuf,
        #[arg(long, env = "EXTSYNC_TRACE_ROOT", default_value = "traces")]
        trace_root: PathBuf,
        #[arg(long)]
        no_progress: bool,
    },
    /// Compare the external-synchrony side of a family against its baseline
    Analyze {
        #[command(flatten)]
        family: FamilyArgs,
        /// Group-key fields; defaults to the plan's dimensions
        #[arg(long, value_delimiter = ',')]
        group_by: Vec<String>,
        #[arg(value_enum, long, default_value_t = Metric::Runtime)]
        metric: Metric,
        #[arg(long, default_value_t = DEFAULT_IQR_MULTIPLIER)]
        iqr_multiplier: f64,
        /// Directory for cached samples; extraction is repeated when unset
        #[arg(long, env = "EXTSYNC_CACHE_DIR")]
        cache_dir: Option<PathBuf>,
        #[arg(long, default_value = "reports")]
        output_dir: PathBuf,
    },
    /// Mean trial-relative completion per function for one side
    Profile {
        #[command(flatten)]
        family: FamilyArgs,
        #[arg(long, default_value = "baseline")]
        policy: ExecutionPolicy,
        #[arg(long, default_value = "reports")]
        output_dir: PathBuf,
    },
    /// Tabulate the analytic improvement bound
    Theoretical {
        /// Durable write time
        #[arg(long, default_value_t = 100.0)]
        write_time: f64,
        #[arg(long, default_value_t = 300.0)]
        max_execution: f64,
        #[arg(long, default_value_t = 10.0)]
        step: f64,
        #[arg(long, default_value = "reports/theoretical.csv")]
        output: PathBuf,
    },
}

#[derive(ClapArgs)]
struct FamilyArgs {
    /// Plan file; supplies the family and its file-name grammar
    #[arg(long, conflicts_with_all = ["family", "pattern"])]
    plan: Option<PathBuf>,
    #[arg(long, requires = "pattern")]
    family: Option<String>,
    /// File-name grammar, e.g. `hello_trial{trial}`
    #[arg(long, requires = "family")]
    pattern: Option<FileNameGrammar>,
    #[arg(long, env = "EXTSYNC_TRACE_ROOT", default_value = "traces")]
    trace_root: PathBuf,
    #[arg(long)]
    no_progress: bool,
}

struct Family {
    name: String,
    grammar: FileNameGrammar,
    dimensions: Vec<String>,
}

impl FamilyArgs {
    fn resolve(&self) -> Result<Family> {
        if let Some(path) = &self.plan {
            let plan = load_plan(path)?;
            return Ok(Family {
                dimensions: plan.dimensions.keys().cloned().collect(),
                name: plan.family,
                grammar: plan.file_name_pattern,
            });
        }
        match (&self.family, &self.pattern) {
            (Some(name), Some(grammar)) => Ok(Family {
                name: name.clone(),
                dimensions: grammar
                    .labels()
                    .filter(|label| *label != TRIAL_FIELD)
                    .map(str::to_string)
                    .collect(),
                grammar: grammar.clone(),
            }),
            _ => bail!("pass either --plan or both --family and --pattern"),
        }
    }

    fn extract_options(&self, family: &Family) -> ExtractOptions {
        ExtractOptions {
            grammar: Some(family.grammar.clone()),
            show_progress: !self.no_progress,
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_plan(path: &Path) -> Result<NormalizedPlan> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading plan {}", path.display()))?;
    let plan: ExperimentPlan = serde_json::from_str(&content)
        .with_context(|| format!("parsing plan {}", path.display()))?;
    Ok(normalize_plan(plan)?)
}

fn load_side(
    args: &FamilyArgs,
    family: &Family,
    policy: ExecutionPolicy,
    cache_dir: Option<&Path>,
) -> Result<Vec<BenchmarkSample>> {
    let dir = trace_dir(&args.trace_root, &family.name, policy);
    let options = args.extract_options(family);
    let extract = || -> Result<Vec<BenchmarkSample>, ExtractError> {
        let report = extract_dir(&dir, &options)?;
        if !report.failures.is_empty() {
            info!(
                policy = %policy,
                failed_files = report.failures.len(),
                "some trace files were skipped"
            );
        }
        Ok(report.samples)
    };

    match cache_dir {
        Some(cache_dir) => {
            let path = sample_cache_path(cache_dir, &family.name, policy);
            Ok(load_or_extract(&path, extract)
                .with_context(|| format!("loading {policy} samples"))?
                .samples)
        }
        None => Ok(extract().with_context(|| format!("extracting {}", dir.display()))?),
    }
}

fn print_comparison(result: &ComparisonResult) {
    println!(
        "{:<40} {:>7} {:>12} {:>12}",
        result.group_key_fields.join(","),
        "trials",
        "mean_pct",
        "std_pct"
    );
    for row in &result.rows {
        let key: Vec<String> = row.key.iter().map(|(_, value)| value.to_string()).collect();
        let std = row
            .std_pct_improvement
            .map(|std| format!("{std:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:>7} {:>12.2} {:>12}",
            key.join(","),
            row.paired_trials,
            row.mean_pct_improvement,
            std
        );
    }
    println!(
        "outliers dropped: optimized {} (max {} per group), baseline {} (max {} per group)",
        result.optimized_outliers.dropped,
        result.optimized_outliers.max_dropped_in_group,
        result.baseline_outliers.dropped,
        result.baseline_outliers.max_dropped_in_group
    );
    if !result.unmatched_keys.is_empty() {
        println!("group keys without paired trials: {}", result.unmatched_keys.len());
    }
}

// ── main ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            plan,
            trace_root,
            no_progress,
        } => {
            let plan = load_plan(&plan)?;
            let options = RunOptions {
                trace_root,
                show_progress: !no_progress,
            };
            let summary = run_plan(&plan, &options).await?;
            for (policy, latency) in &summary.caller_latency {
                println!(
                    "{:<10} trials={:<5} mean={:.3}ms p90={:.3}ms",
                    policy.as_str(),
                    latency.count,
                    latency.mean / 1e6,
                    latency.p90 / 1e6
                );
            }
            println!(
                "{} trace files written, {} failed trials (plan {})",
                summary.files_written.len(),
                summary.failed_trials,
                summary.plan_fingerprint
            );
        }
        Commands::Analyze {
            family: args,
            group_by,
            metric,
            iqr_multiplier,
            cache_dir,
            output_dir,
        } => {
            let family = args.resolve()?;
            let group_by = if group_by.is_empty() {
                family.dimensions.clone()
            } else {
                group_by
            };
            let baseline = load_side(&args, &family, ExecutionPolicy::Baseline, cache_dir.as_deref())?;
            let optimized = load_side(
                &args,
                &family,
                ExecutionPolicy::ExternalSynchrony,
                cache_dir.as_deref(),
            )?;

            let options = CompareOptions::new(group_by)
                .with_metric(metric)
                .with_outlier_rule(OutlierRule::with_multiplier(iqr_multiplier));
            let result = compare(&optimized, &baseline, &options)?;
            print_comparison(&result);

            if result.rows.is_empty() {
                bail!("no (group key, trial) tuples are present on both sides");
            }
            let csv_path = report_path(&output_dir, &family.name, ArtifactKind::Comparison, "csv");
            export_comparison_csv(&result, &csv_path)?;
            export_comparison_json(
                &result,
                report_path(&output_dir, &family.name, ArtifactKind::Comparison, "json"),
            )?;
            info!(path = %csv_path.display(), "comparison_exported");
        }
        Commands::Profile {
            family: args,
            policy,
            output_dir,
        } => {
            let family = args.resolve()?;
            let samples = load_side(&args, &family, policy, None)?;
            let profile = function_latency_profile(&samples);
            for entry in &profile {
                println!(
                    "{:<24} n={:<6} mean_net_completed={:.3}ms",
                    entry.function,
                    entry.samples,
                    entry.mean_net_completed_ns / 1e6
                );
            }
            export_profile_csv(
                &profile,
                report_path(&output_dir, &family.name, ArtifactKind::LatencyProfile, "csv"),
            )?;
        }
        Commands::Theoretical {
            write_time,
            max_execution,
            step,
            output,
        } => {
            if step <= 0.0 {
                bail!("--step must be positive");
            }
            let curve = theoretical_curve(execution_range(max_execution, step), write_time);
            for point in &curve {
                println!(
                    "x={:<8} baseline={:<8} ext_sync={:<8} improvement={:.1}%",
                    point.execution_time, point.baseline, point.ext_sync, point.pct_improvement
                );
            }
            export_theoretical_csv(&curve, &output)?;
        }
    }

    Ok(())
}
