mod support;

use extsync_bench::cache::load_or_extract;
use extsync_bench::compare::{compare, CompareOptions};
use extsync_bench::profile::function_latency_profile;
use extsync_bench::runner::{run_plan, RunOptions};
use extsync_bench::samples::{GroupValue, Metric};
use extsync_core::contract::ExecutionPolicy;
use extsync_core::layout::sample_cache_path;
use support::{bundled_plan, chained_synthetic_plan, extract_side, samples_by_trial};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_extract_compare_pipeline() {
    let root = tempfile::tempdir().expect("tempdir should be created");
    let plan = chained_synthetic_plan(&[20], 3);

    let summary = run_plan(&plan, &RunOptions::new(root.path()))
        .await
        .expect("run should pass");
    assert_eq!(summary.failed_trials, 0);
    assert_eq!(summary.files_written.len(), 6);

    let baseline = extract_side(root.path(), &plan, ExecutionPolicy::Baseline);
    let optimized = extract_side(root.path(), &plan, ExecutionPolicy::ExternalSynchrony);
    assert!(baseline.failures.is_empty());
    assert_eq!(baseline.samples.len(), 6);
    assert_eq!(optimized.samples.len(), 6);
    assert_eq!(baseline.warmups_skipped, 0);

    let options = CompareOptions::new(["reps", "interop_compute_ms", "remaining_workflow_len"]);
    let result = compare(&optimized.samples, &baseline.samples, &options)
        .expect("compare should pass");

    let root_row = result
        .rows
        .iter()
        .find(|row| {
            row.key
                .iter()
                .any(|(field, value)| field == "remaining_workflow_len" && *value == GroupValue::Int(1))
        })
        .expect("root invocations should be paired");
    assert_eq!(root_row.paired_trials, 3);
    assert!(root_row.mean_pct_improvement > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cached_samples_compare_identically_to_fresh_extraction() {
    let root = tempfile::tempdir().expect("tempdir should be created");
    let cache = tempfile::tempdir().expect("tempdir should be created");
    let plan = chained_synthetic_plan(&[0, 5], 2);
    run_plan(&plan, &RunOptions::new(root.path()))
        .await
        .expect("run should pass");

    let fresh_baseline = extract_side(root.path(), &plan, ExecutionPolicy::Baseline).samples;
    let fresh_optimized =
        extract_side(root.path(), &plan, ExecutionPolicy::ExternalSynchrony).samples;

    let mut cached = Vec::new();
    for (policy, samples) in [
        (ExecutionPolicy::Baseline, &fresh_baseline),
        (ExecutionPolicy::ExternalSynchrony, &fresh_optimized),
    ] {
        let path = sample_cache_path(cache.path(), &plan.family, policy);
        load_or_extract(&path, || Ok(samples.clone())).expect("cache write should pass");
        let load = load_or_extract(&path, || panic!("cache should be used"))
            .expect("cache read should pass");
        assert!(load.from_cache);
        cached.push(load.samples);
    }

    let options = CompareOptions::new(["reps", "interop_compute_ms", "function"]);
    let fresh = compare(&fresh_optimized, &fresh_baseline, &options).expect("compare should pass");
    let from_cache = compare(&cached[1], &cached[0], &options).expect("compare should pass");

    assert_eq!(fresh, from_cache);
    assert_eq!(fresh.rows.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn continuation_completes_after_its_root_starts() {
    let root = tempfile::tempdir().expect("tempdir should be created");
    let plan = chained_synthetic_plan(&[5], 2);
    run_plan(&plan, &RunOptions::new(root.path()))
        .await
        .expect("run should pass");

    let samples = extract_side(root.path(), &plan, ExecutionPolicy::ExternalSynchrony).samples;
    let profile = function_latency_profile(&samples);

    assert_eq!(profile.len(), 1);
    assert_eq!(profile[0].samples, 4);
    for sample in &samples {
        assert!(sample.net_completed >= sample.runtime_ns);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multifunction_trials_keep_one_identity_while_args_drift() {
    let root = tempfile::tempdir().expect("tempdir should be created");
    let plan = bundled_plan("multifunction.json", 2);

    let summary = run_plan(&plan, &RunOptions::new(root.path()))
        .await
        .expect("run should pass");
    assert_eq!(summary.failed_trials, 0);
    assert_eq!(summary.files_written.len(), 8);

    for policy in ExecutionPolicy::ALL {
        let report = extract_side(root.path(), &plan, policy);
        assert!(report.failures.is_empty());
        assert_eq!(report.samples.len(), 16);

        let trials = samples_by_trial(&report.samples);
        assert_eq!(trials.len(), 4);
        for ((source, _), samples) in &trials {
            assert_eq!(samples.len(), 4);
            let expected = if source.contains("init1") { 1 } else { 0 };
            let origin = samples
                .iter()
                .map(|sample| sample.launched)
                .min()
                .expect("trial should have samples");
            for sample in samples {
                assert_eq!(sample.params["initial_value"], expected);
                assert_eq!(sample.net_completed, sample.completed - origin);
                assert!(sample.net_completed >= sample.runtime_ns);
            }
        }
    }

    let baseline = extract_side(root.path(), &plan, ExecutionPolicy::Baseline).samples;
    let optimized = extract_side(root.path(), &plan, ExecutionPolicy::ExternalSynchrony).samples;
    let options = CompareOptions::new(["initial_value"]).with_metric(Metric::NetCompleted);
    let result = compare(&optimized, &baseline, &options).expect("compare should pass");

    assert_eq!(result.rows.len(), 2);
    assert!(result.rows.iter().all(|row| row.paired_trials == 2));
    assert!(result.unmatched_keys.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn graderbot_chain_extracts_two_records_per_trial() {
    let root = tempfile::tempdir().expect("tempdir should be created");
    let plan = bundled_plan("graderbot.json", 3);

    let summary = run_plan(&plan, &RunOptions::new(root.path()))
        .await
        .expect("run should pass");
    assert_eq!(summary.failed_trials, 0);
    assert_eq!(summary.files_written.len(), 6);

    for policy in ExecutionPolicy::ALL {
        let report = extract_side(root.path(), &plan, policy);
        assert!(report.failures.is_empty());

        let trials = samples_by_trial(&report.samples);
        assert_eq!(trials.len(), 3);
        for ((source, trial), samples) in &trials {
            assert_eq!(source, &format!("graderbot_trial{trial}.ndjson"));
            let pre = samples
                .iter()
                .find(|sample| sample.function == "graderbot_pre")
                .expect("pre step should be recorded");
            let post = samples
                .iter()
                .find(|sample| sample.function == "graderbot_post")
                .expect("post step should be recorded");
            assert_eq!(pre.remaining_workflow_len, 1);
            assert_eq!(post.remaining_workflow_len, 0);
            assert!(pre.params.is_empty() && post.params.is_empty());
            let origin = pre.launched.min(post.launched);
            assert_eq!(post.net_completed, post.completed - origin);
            assert!(post.net_completed >= post.runtime_ns);
        }
    }
}
