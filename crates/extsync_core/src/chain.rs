use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::contract::{Args, Context, WorkflowEnvelope};
use crate::syscalls::{SyscallError, Syscalls};

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Syscall(#[from] SyscallError),
    #[error("missing argument '{0}'")]
    MissingArgument(String),
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("continuation payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

/// Application logic of one workflow function.
pub trait StepLogic: Send + Sync {
    fn run(&self, args: Args, context: &Context, syscalls: &dyn Syscalls)
        -> Result<Args, StepError>;
}

impl<F> StepLogic for F
where
    F: Fn(Args, &Context, &dyn Syscalls) -> Result<Args, StepError> + Send + Sync,
{
    fn run(
        &self,
        args: Args,
        context: &Context,
        syscalls: &dyn Syscalls,
    ) -> Result<Args, StepError> {
        self(args, context, syscalls)
    }
}

/// Runs one step and, when work remains, issues exactly one continuation
/// carrying the step's result, the tail of the workflow and the unchanged
/// context. A failing step issues nothing.
pub fn handle(
    envelope: WorkflowEnvelope,
    logic: &dyn StepLogic,
    syscalls: &dyn Syscalls,
) -> Result<Args, StepError> {
    let WorkflowEnvelope {
        args,
        mut workflow,
        context,
    } = envelope;

    let result = logic.run(args, &context, syscalls)?;

    if let Some(next_function) = workflow.pop_front() {
        let continuation = WorkflowEnvelope {
            args: result.clone(),
            workflow,
            context,
        };
        debug!(
            next_function = %next_function,
            remaining = continuation.workflow.len(),
            "continuation_issued"
        );
        syscalls.invoke(&next_function, &continuation.to_payload()?)?;
    }

    Ok(result)
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn StepLogic>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, logic: impl StepLogic + 'static) {
        self.functions.insert(name.into(), Arc::new(logic));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StepLogic>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
