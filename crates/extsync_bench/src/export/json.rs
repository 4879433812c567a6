use crate::compare::ComparisonResult;

pub(crate) fn export_to_json_impl(
    result: &ComparisonResult,
    file: std::fs::File,
) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(file, result)
}
