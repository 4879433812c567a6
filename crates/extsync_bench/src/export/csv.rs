use crate::compare::ComparisonResult;
use crate::profile::FunctionLatency;
use crate::theoretical::TheoreticalPoint;

pub(crate) fn export_comparison_csv_impl(
    result: &ComparisonResult,
    file: std::fs::File,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(file);

    let mut header: Vec<&str> = result.group_key_fields.iter().map(String::as_str).collect();
    header.extend([
        "paired_trials",
        "mean_pct_improvement",
        "std_pct_improvement",
        "optimized_outliers_dropped",
        "baseline_outliers_dropped",
        "max_dropped_in_group",
    ]);
    wtr.write_record(&header)?;

    let max_dropped = result
        .optimized_outliers
        .max_dropped_in_group
        .max(result.baseline_outliers.max_dropped_in_group);
    for row in &result.rows {
        let mut record: Vec<String> = row.key.iter().map(|(_, value)| value.to_string()).collect();
        record.extend([
            row.paired_trials.to_string(),
            row.mean_pct_improvement.to_string(),
            row.std_pct_improvement
                .map(|std| std.to_string())
                .unwrap_or_default(),
            result.optimized_outliers.dropped.to_string(),
            result.baseline_outliers.dropped.to_string(),
            max_dropped.to_string(),
        ]);
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub(crate) fn export_profile_csv_impl(
    profile: &[FunctionLatency],
    file: std::fs::File,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(["function", "samples", "mean_net_completed_ns"])?;
    for entry in profile {
        wtr.write_record([
            entry.function.clone(),
            entry.samples.to_string(),
            entry.mean_net_completed_ns.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub(crate) fn export_theoretical_csv_impl(
    curve: &[TheoreticalPoint],
    file: std::fs::File,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record([
        "execution_time",
        "write_time",
        "baseline",
        "ext_sync",
        "pct_improvement",
    ])?;
    for point in curve {
        wtr.write_record([
            point.execution_time.to_string(),
            point.write_time.to_string(),
            point.baseline.to_string(),
            point.ext_sync.to_string(),
            point.pct_improvement.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
