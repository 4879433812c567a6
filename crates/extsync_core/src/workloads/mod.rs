//! Bundled benchmark workloads.
//!
//! Each workload is a plain function usable as [`StepLogic`]; chaining is
//! added by [`crate::chain::handle`], never by the workload itself.

use serde_json::Value;

use crate::chain::{FunctionRegistry, StepError};
use crate::contract::{Args, Context};

pub mod graderbot;
pub mod hello;
pub mod multifunction;
pub mod synthetic;

pub const SYNTHETIC: &str = "synthetic";
pub const HELLO: &str = "hello";
pub const HELLO_FS: &str = "hello_fs";
pub const MULTIFUNCTION_F1: &str = "multifunction_f1";
pub const MULTIFUNCTION_F2: &str = "multifunction_f2";
pub const GRADERBOT_PRE: &str = "graderbot_pre";
pub const GRADERBOT_POST: &str = "graderbot_post";

pub fn bundled_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register(SYNTHETIC, synthetic::run);
    registry.register(HELLO, hello::run);
    registry.register(HELLO_FS, hello::run_fs);
    registry.register(MULTIFUNCTION_F1, multifunction::run_f1);
    registry.register(MULTIFUNCTION_F2, multifunction::run_f2);
    registry.register(GRADERBOT_PRE, graderbot::run_pre);
    registry.register(GRADERBOT_POST, graderbot::run_post);
    registry
}

pub(crate) fn int_arg(args: &Args, name: &str) -> Result<i64, StepError> {
    let value = args
        .get(name)
        .ok_or_else(|| StepError::MissingArgument(name.to_string()))?;
    value.as_i64().ok_or_else(|| StepError::InvalidArgument {
        name: name.to_string(),
        reason: format!("expected an integer, got {value}"),
    })
}

pub(crate) fn non_negative_arg(args: &Args, name: &str) -> Result<u64, StepError> {
    let value = int_arg(args, name)?;
    u64::try_from(value).map_err(|_| StepError::InvalidArgument {
        name: name.to_string(),
        reason: format!("expected a non-negative integer, got {value}"),
    })
}

pub(crate) fn str_arg<'a>(args: &'a Args, name: &str) -> Result<&'a str, StepError> {
    let value = args
        .get(name)
        .ok_or_else(|| StepError::MissingArgument(name.to_string()))?;
    value.as_str().ok_or_else(|| StepError::InvalidArgument {
        name: name.to_string(),
        reason: format!("expected a string, got {value}"),
    })
}

pub(crate) fn str_arg_or<'a>(args: &'a Args, name: &str, default: &'a str) -> &'a str {
    args.get(name).and_then(Value::as_str).unwrap_or(default)
}

/// The invocation time stamped into the context by the benchmark driver.
pub(crate) fn context_time(context: &Context) -> String {
    match context.get("time") {
        Some(Value::String(time)) => time.clone(),
        Some(other) => other.to_string(),
        None => "0".to_string(),
    }
}
