//! Per-invocation externalization state.
//!
//! An invocation starts `Running`, may be explicitly externalized once, and
//! ends `Completed`. Completing without an explicit externalization is an
//! implicit externalization at the completion time, so every completed
//! invocation has exactly one externalization point and it never follows
//! completion.

use crate::contract::ExecutionPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExternalizationState {
    #[default]
    Running,
    Externalized {
        at: i64,
    },
    Completed {
        externalized_at: i64,
        completed_at: i64,
        explicit: bool,
    },
}

/// Whether a transition released the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Released { at: i64 },
    Unchanged,
}

impl ExternalizationState {
    /// First call wins; later signals are no-ops.
    pub fn externalize(&mut self, at: i64) -> Transition {
        match *self {
            Self::Running => {
                *self = Self::Externalized { at };
                Transition::Released { at }
            }
            Self::Externalized { .. } | Self::Completed { .. } => Transition::Unchanged,
        }
    }

    pub fn complete(&mut self, at: i64) -> Transition {
        match *self {
            Self::Running => {
                *self = Self::Completed {
                    externalized_at: at,
                    completed_at: at,
                    explicit: false,
                };
                Transition::Released { at }
            }
            Self::Externalized {
                at: externalized_at,
            } => {
                *self = Self::Completed {
                    externalized_at,
                    completed_at: at.max(externalized_at),
                    explicit: true,
                };
                Transition::Unchanged
            }
            Self::Completed { .. } => Transition::Unchanged,
        }
    }

    pub fn externalized_at(&self) -> Option<i64> {
        match *self {
            Self::Running => None,
            Self::Externalized { at } => Some(at),
            Self::Completed {
                externalized_at, ..
            } => Some(externalized_at),
        }
    }

    pub fn completed_at(&self) -> Option<i64> {
        match *self {
            Self::Completed { completed_at, .. } => Some(completed_at),
            _ => None,
        }
    }

    pub fn is_released(&self) -> bool {
        self.externalized_at().is_some()
    }
}

/// Timestamp written to an invocation's record as `completed`.
///
/// Baseline records the end of the whole chain the invocation started;
/// external synchrony records the externalization point. Returns `None`
/// until the invocation itself has completed.
pub fn recorded_completion(
    policy: ExecutionPolicy,
    state: &ExternalizationState,
    chain_completed_at: i64,
) -> Option<i64> {
    let completed_at = state.completed_at()?;
    match policy {
        ExecutionPolicy::Baseline => Some(chain_completed_at.max(completed_at)),
        ExecutionPolicy::ExternalSynchrony => state.externalized_at(),
    }
}
