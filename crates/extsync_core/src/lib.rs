//! Shared workflow-chaining primitives.
//!
//! This crate owns the request envelope, execution records, the syscall
//! capability surface, the externalization state machine and the on-disk
//! trace layout. It intentionally excludes any execution substrate; the
//! in-process host lives in `extsync_host`.

pub mod chain;
pub mod contract;
pub mod externalization;
pub mod filename;
pub mod grid;
pub mod layout;
pub mod syscalls;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod workloads;
