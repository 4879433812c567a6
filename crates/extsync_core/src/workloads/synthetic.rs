use std::thread;
use std::time::Duration;

use crate::chain::StepError;
use crate::contract::{Args, Context};
use crate::syscalls::Syscalls;

use super::non_negative_arg;

pub const REPS_ARG: &str = "reps";
pub const INTEROP_COMPUTE_MS_ARG: &str = "interop_compute_ms";

/// Writes `reps` random values, computing for `interop_compute_ms` after each
/// write, then externalizes and echoes its arguments.
pub fn run(args: Args, _context: &Context, syscalls: &dyn Syscalls) -> Result<Args, StepError> {
    let reps = non_negative_arg(&args, REPS_ARG)?;
    let interop = Duration::from_millis(non_negative_arg(&args, INTEROP_COMPUTE_MS_ARG)?);

    for rep in 0..reps {
        let value = rand::random::<f64>().to_string();
        syscalls.write_key(rep.to_string().as_bytes(), value.as_bytes())?;
        if !interop.is_zero() {
            thread::sleep(interop);
        }
    }

    syscalls.externalize()?;
    Ok(args)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_helpers::MemorySyscalls;

    #[test]
    fn writes_one_key_per_rep_then_externalizes() {
        let syscalls = MemorySyscalls::default();
        let args = Args::from([
            (REPS_ARG.to_string(), json!(5)),
            (INTEROP_COMPUTE_MS_ARG.to_string(), json!(0)),
        ]);

        let result = run(args.clone(), &Context::new(), &syscalls).expect("step should pass");

        assert_eq!(result, args);
        assert_eq!(syscalls.key_count(), 5);
        assert!(syscalls.value("4").is_some());
        assert_eq!(syscalls.externalize_count(), 1);
    }

    #[test]
    fn rejects_negative_reps() {
        let syscalls = MemorySyscalls::default();
        let args = Args::from([
            (REPS_ARG.to_string(), json!(-1)),
            (INTEROP_COMPUTE_MS_ARG.to_string(), json!(0)),
        ]);

        let error = run(args, &Context::new(), &syscalls).expect_err("step should fail");

        assert!(matches!(error, StepError::InvalidArgument { .. }));
        assert_eq!(syscalls.externalize_count(), 0);
    }
}
