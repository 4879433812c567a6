//! In-process execution host for workflow chains.
//!
//! This crate owns the runtime side of a benchmark: the key-value store and
//! labeled filesystem adapters, the syscall surface handed to each step, the
//! tokio-based host that applies an execution policy, and trace sinks. Chain
//! semantics and record shapes come from `extsync_core`.

pub mod adapters;
pub mod clock;
pub mod host;
pub mod syscalls;
pub mod trace;
