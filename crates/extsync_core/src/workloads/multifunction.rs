use serde_json::json;

use crate::chain::StepError;
use crate::contract::{Args, Context};
use crate::syscalls::Syscalls;

use super::{context_time, int_arg};

pub const F1_COUNTER_ARG: &str = "initial_value";
pub const F2_COUNTER_ARG: &str = "f2_seed";
const F1_KEY: &str = "f1";
const F2_KEY: &str = "f2";
/// Both links derive their later-visit keys under this prefix.
const DERIVED_KEY_PREFIX: &str = "f2";

/// First link of the pair. The counter decides whether this is the first
/// visit; later visits require the value the first one stored.
pub fn run_f1(args: Args, context: &Context, syscalls: &dyn Syscalls) -> Result<Args, StepError> {
    let mut args = args;
    let counter = int_arg(&args, F1_COUNTER_ARG)?;

    if counter < 2 {
        store_first(&mut args, syscalls, F1_KEY, "v1")?;
    } else {
        store_derived(&mut args, context, syscalls, F1_KEY, "v1")?;
    }

    args.insert(F1_COUNTER_ARG.to_string(), json!(counter.saturating_mul(2)));
    Ok(args)
}

/// Second link of the pair. Same shape as [`run_f1`] with an incrementing
/// seed; a later visit fails with `NotFound` when nothing was stored first.
pub fn run_f2(args: Args, context: &Context, syscalls: &dyn Syscalls) -> Result<Args, StepError> {
    let mut args = args;
    let seed = int_arg(&args, F2_COUNTER_ARG)?;

    if seed < 1 {
        store_first(&mut args, syscalls, F2_KEY, "v2")?;
    } else {
        store_derived(&mut args, context, syscalls, F2_KEY, "v2")?;
    }

    args.insert(F2_COUNTER_ARG.to_string(), json!(seed.saturating_add(1)));
    Ok(args)
}

fn store_first(
    args: &mut Args,
    syscalls: &dyn Syscalls,
    key: &str,
    value: &str,
) -> Result<(), StepError> {
    syscalls.write_key(key.as_bytes(), value.as_bytes())?;
    args.insert(key.to_string(), json!(value));
    Ok(())
}

fn store_derived(
    args: &mut Args,
    context: &Context,
    syscalls: &dyn Syscalls,
    source_key: &str,
    value: &str,
) -> Result<(), StepError> {
    let previous = syscalls.read_key(source_key.as_bytes())?;
    let key = format!(
        "{DERIVED_KEY_PREFIX}_{}_{}",
        String::from_utf8_lossy(&previous),
        context_time(context)
    );
    syscalls.write_key(key.as_bytes(), value.as_bytes())?;
    args.insert(key, json!(value));
    Ok(())
}
