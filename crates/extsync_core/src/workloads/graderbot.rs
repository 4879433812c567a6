use serde_json::json;

use crate::chain::StepError;
use crate::contract::{Args, Context};
use crate::syscalls::Syscalls;

use super::{int_arg, str_arg, str_arg_or};

const DEFAULT_COURSE: &str = "cos316";
const DEFAULT_ASSIGNMENT: &str = "example";
const DEFAULT_RUNTIME_LIMIT: i64 = 1;
pub const RUNTIME_LIMIT_ARG: &str = "runtime_limit";
pub const GRADER_CONFIG_ARG: &str = "grader_config";

/// Seeds the store with everything the grader reads: the grading script,
/// the submission, the assignment index and the grader configuration.
///
/// `runtime_limit` is a top-level integer argument recorded in the
/// assignment index; `grader_config` is stored as given.
pub fn run_pre(args: Args, _context: &Context, syscalls: &dyn Syscalls) -> Result<Args, StepError> {
    let course = str_arg_or(&args, "course", DEFAULT_COURSE);
    let assignment = str_arg_or(&args, "assignment", DEFAULT_ASSIGNMENT);
    let grading_script = str_arg_or(&args, "grading_script", "");
    let submission = str_arg_or(&args, "submission", "");
    let runtime_limit = if args.contains_key(RUNTIME_LIMIT_ARG) {
        int_arg(&args, RUNTIME_LIMIT_ARG)?
    } else {
        DEFAULT_RUNTIME_LIMIT
    };

    let script_key = format!("{course}/{assignment}/grading_script");
    syscalls.write_key(script_key.as_bytes(), grading_script.as_bytes())?;
    syscalls.write_key(
        format!("github/{course}/{assignment}/submission.tgz").as_bytes(),
        submission.as_bytes(),
    )?;

    let assignments = json!({
        assignment: { "grading_script": script_key, "runtime_limit": runtime_limit }
    });
    syscalls.write_key(
        format!("{course}/assignments").as_bytes(),
        serde_json::to_vec(&assignments)?.as_slice(),
    )?;

    let config = args
        .get(GRADER_CONFIG_ARG)
        .cloned()
        .unwrap_or_else(|| json!({ "test": {}, "subtest": { "delim": "\n" } }));
    syscalls.write_key(
        format!("{course}/{assignment}/grader_config").as_bytes(),
        serde_json::to_vec(&config)?.as_slice(),
    )?;

    Ok(args)
}

/// Externalizes first, then fetches the report named by `report`.
pub fn run_post(args: Args, _context: &Context, syscalls: &dyn Syscalls) -> Result<Args, StepError> {
    syscalls.externalize()?;

    let report_key = str_arg(&args, "report")?;
    let report = syscalls.read_key(report_key.as_bytes())?;

    Ok(Args::from([
        ("report".to_string(), json!(report_key)),
        (
            "contents".to_string(),
            json!(String::from_utf8_lossy(&report)),
        ),
    ]))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::test_helpers::MemorySyscalls;

    #[test]
    fn pre_writes_assignment_index_and_config() {
        let syscalls = MemorySyscalls::default();
        let args = Args::from([
            ("grading_script".to_string(), json!("#!/bin/sh")),
            ("submission".to_string(), json!("tarball")),
        ]);

        let result = run_pre(args.clone(), &Context::new(), &syscalls).expect("step should pass");

        assert_eq!(result, args);
        assert_eq!(
            syscalls.value("cos316/example/grading_script").as_deref(),
            Some("#!/bin/sh")
        );
        assert_eq!(
            syscalls.value("github/cos316/example/submission.tgz").as_deref(),
            Some("tarball")
        );
        let index: Value = serde_json::from_str(
            &syscalls
                .value("cos316/assignments")
                .expect("index should be written"),
        )
        .expect("index should be json");
        assert_eq!(
            index["example"]["grading_script"],
            json!("cos316/example/grading_script")
        );
        assert_eq!(index["example"]["runtime_limit"], json!(1));
        assert!(syscalls.value("cos316/example/grader_config").is_some());
        assert_eq!(syscalls.externalize_count(), 0);
    }

    #[test]
    fn pre_records_runtime_limit_and_stores_config_as_given() {
        let syscalls = MemorySyscalls::default();
        let config = json!({ "test": { "timeout": 3 }, "subtest": { "delim": ";" } });
        let args = Args::from([
            (RUNTIME_LIMIT_ARG.to_string(), json!(5)),
            (GRADER_CONFIG_ARG.to_string(), config.clone()),
        ]);

        run_pre(args, &Context::new(), &syscalls).expect("step should pass");

        let index: Value = serde_json::from_str(
            &syscalls
                .value("cos316/assignments")
                .expect("index should be written"),
        )
        .expect("index should be json");
        assert_eq!(index["example"]["runtime_limit"], json!(5));
        let stored: Value = serde_json::from_str(
            &syscalls
                .value("cos316/example/grader_config")
                .expect("config should be written"),
        )
        .expect("config should be json");
        assert_eq!(stored, config);
    }

    #[test]
    fn pre_rejects_non_integer_runtime_limit() {
        let syscalls = MemorySyscalls::default();
        let args = Args::from([(RUNTIME_LIMIT_ARG.to_string(), json!("1s"))]);

        let error = run_pre(args, &Context::new(), &syscalls).expect_err("step should fail");

        assert!(matches!(error, StepError::InvalidArgument { name, .. } if name == RUNTIME_LIMIT_ARG));
        assert_eq!(syscalls.key_count(), 0);
    }

    #[test]
    fn post_externalizes_before_reading_report() {
        let syscalls = MemorySyscalls::with_entries([("reports/1", "all tests passed")]);
        let args = Args::from([("report".to_string(), json!("reports/1"))]);

        let result = run_post(args, &Context::new(), &syscalls).expect("step should pass");

        assert_eq!(result["contents"], json!("all tests passed"));
        assert_eq!(syscalls.externalize_count(), 1);
    }

    #[test]
    fn post_without_report_fails_after_externalizing() {
        let syscalls = MemorySyscalls::default();

        let error = run_post(Args::new(), &Context::new(), &syscalls).expect_err("step should fail");

        assert!(matches!(error, StepError::MissingArgument(_)));
        assert_eq!(syscalls.externalize_count(), 1);
    }
}
