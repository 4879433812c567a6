//! Tokio-backed execution host.
//!
//! Every invocation runs its step on the blocking pool. Continuations issued
//! through the `invoke` syscall are spawned immediately and tracked as the
//! issuing invocation's children, so each invocation knows when the chain it
//! started has finished. The configured [`ExecutionPolicy`] decides both when
//! the original caller is released and which timestamp is recorded as
//! `completed`:
//!
//! - baseline releases the caller once the whole chain has finished and
//!   records chain completion;
//! - external synchrony releases the caller at the externalization point
//!   (explicit signal or return, whichever comes first) and records it.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use extsync_core::chain::{self, FunctionRegistry, StepError, StepLogic};
use extsync_core::contract::{
    Args, ExecutionPolicy, ExecutionRecord, KeyScope, RecordedRequest, WorkflowEnvelope,
};
use extsync_core::externalization::{recorded_completion, ExternalizationState, Transition};
use extsync_core::syscalls::SyscallError;

use crate::adapters::invoke::{ContinuationInvoker, ExternalizeSignal};
use crate::adapters::kv_store::KvStore;
use crate::clock::{Clock, SystemClock};
use crate::syscalls::StepSyscalls;
use crate::trace::TraceSink;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("step '{function}' failed: {source}")]
    StepFailed { function: String, source: StepError },
    #[error("invocation of '{function}' was aborted: {message}")]
    Aborted { function: String, message: String },
    #[error("invocation of '{function}' ended without releasing its caller")]
    Unreleased { function: String },
    #[error("host must be created inside a tokio runtime: {0}")]
    NoRuntime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    pub policy: ExecutionPolicy,
    pub key_scope: KeyScope,
}

impl HostConfig {
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self {
            policy,
            key_scope: KeyScope::default(),
        }
    }

    pub fn with_key_scope(mut self, key_scope: KeyScope) -> Self {
        self.key_scope = key_scope;
        self
    }
}

/// What the original caller observes.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerResponse {
    pub function: String,
    pub launched: i64,
    pub released_at: i64,
    /// Present when the step had returned by the time the caller was released.
    pub result: Option<Args>,
}

impl CallerResponse {
    pub fn latency_ns(&self) -> i64 {
        self.released_at - self.launched
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub function: String,
    pub result: Args,
    pub completed_at: i64,
    pub failed_descendants: usize,
}

type ChainHandle = JoinHandle<Result<ChainOutcome, HostError>>;

enum ChainWait {
    Finished(ChainOutcome),
    Running { function: String, handle: ChainHandle },
}

pub struct Submission {
    pub response: CallerResponse,
    chain: ChainWait,
}

impl Submission {
    /// Waits until every invocation of the chain has finished and been
    /// recorded.
    pub async fn wait_chain(self) -> Result<ChainOutcome, HostError> {
        match self.chain {
            ChainWait::Finished(outcome) => Ok(outcome),
            ChainWait::Running { function, handle } => join_chain(&function, handle).await,
        }
    }
}

#[derive(Clone)]
pub struct LocalHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    registry: FunctionRegistry,
    store: Arc<dyn KvStore>,
    sink: Arc<dyn TraceSink>,
    clock: Arc<dyn Clock>,
    config: HostConfig,
    runtime: Handle,
}

impl LocalHost {
    pub fn new(
        registry: FunctionRegistry,
        store: Arc<dyn KvStore>,
        sink: Arc<dyn TraceSink>,
        config: HostConfig,
    ) -> Result<Self, HostError> {
        Self::with_clock(registry, store, sink, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        registry: FunctionRegistry,
        store: Arc<dyn KvStore>,
        sink: Arc<dyn TraceSink>,
        config: HostConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HostError> {
        let runtime = Handle::try_current().map_err(|error| HostError::NoRuntime(error.to_string()))?;
        Ok(Self {
            inner: Arc::new(HostInner {
                registry,
                store,
                sink,
                clock,
                config,
                runtime,
            }),
        })
    }

    pub fn config(&self) -> HostConfig {
        self.inner.config
    }

    /// Starts `function` as the root of a chain and returns once the caller
    /// is released under the host's policy.
    pub async fn submit(
        &self,
        function: &str,
        envelope: WorkflowEnvelope,
    ) -> Result<Submission, HostError> {
        let (sender, receiver) = oneshot::channel();
        let (launched, handle) = self.inner.launch(function, envelope, Some(sender))?;

        match self.inner.config.policy {
            ExecutionPolicy::Baseline => {
                let outcome = join_chain(function, handle).await?;
                let response = CallerResponse {
                    function: function.to_string(),
                    launched,
                    released_at: outcome.completed_at,
                    result: Some(outcome.result.clone()),
                };
                Ok(Submission {
                    response,
                    chain: ChainWait::Finished(outcome),
                })
            }
            ExecutionPolicy::ExternalSynchrony => match receiver.await {
                Ok(release) => Ok(Submission {
                    response: CallerResponse {
                        function: function.to_string(),
                        launched,
                        released_at: release.at,
                        result: release.result,
                    },
                    chain: ChainWait::Running {
                        function: function.to_string(),
                        handle,
                    },
                }),
                Err(_) => match join_chain(function, handle).await {
                    Err(error) => Err(error),
                    Ok(_) => Err(HostError::Unreleased {
                        function: function.to_string(),
                    }),
                },
            },
        }
    }
}

struct Release {
    at: i64,
    result: Option<Args>,
}

struct Invocation {
    function: String,
    state: Mutex<ExternalizationState>,
    release: Mutex<Option<oneshot::Sender<Release>>>,
    children: Mutex<Vec<ChainHandle>>,
    clock: Arc<dyn Clock>,
}

impl Invocation {
    fn release(&self, at: i64, result: Option<Args>) {
        if let Some(sender) = self.release.lock().expect("poisoned mutex").take() {
            // The caller may have stopped listening; the chain still runs.
            let _ = sender.send(Release { at, result });
        }
    }

    fn abandon_release(&self) {
        self.release.lock().expect("poisoned mutex").take();
    }

    fn take_children(&self) -> Vec<ChainHandle> {
        std::mem::take(&mut *self.children.lock().expect("poisoned mutex"))
    }
}

impl ExternalizeSignal for Invocation {
    fn externalize(&self) {
        let now = self.clock.now_ns();
        let transition = self.state.lock().expect("poisoned mutex").externalize(now);
        if let Transition::Released { at } = transition {
            info!(function = %self.function, at, "invocation_externalized");
            self.release(at, None);
        }
    }
}

struct ChildLauncher {
    host: Arc<HostInner>,
    parent: Arc<Invocation>,
}

impl ContinuationInvoker for ChildLauncher {
    fn invoke_async(&self, function: &str, envelope: WorkflowEnvelope) -> Result<(), SyscallError> {
        let (_, handle) = self
            .host
            .launch(function, envelope, None)
            .map_err(|error| match error {
                HostError::UnknownFunction(name) => SyscallError::UnknownFunction(name),
                other => SyscallError::Invoke {
                    function: function.to_string(),
                    reason: other.to_string(),
                },
            })?;
        self.parent
            .children
            .lock()
            .expect("poisoned mutex")
            .push(handle);
        Ok(())
    }
}

impl HostInner {
    fn launch(
        self: &Arc<Self>,
        function: &str,
        envelope: WorkflowEnvelope,
        release: Option<oneshot::Sender<Release>>,
    ) -> Result<(i64, ChainHandle), HostError> {
        let logic = self
            .registry
            .get(function)
            .ok_or_else(|| HostError::UnknownFunction(function.to_string()))?;
        let launched = self.clock.now_ns();
        let invocation = Arc::new(Invocation {
            function: function.to_string(),
            state: Mutex::new(ExternalizationState::Running),
            release: Mutex::new(release),
            children: Mutex::new(Vec::new()),
            clock: Arc::clone(&self.clock),
        });
        let handle = self.runtime.spawn(Arc::clone(self).run_invocation(
            invocation, logic, envelope, launched,
        ));
        Ok((launched, handle))
    }

    async fn run_invocation(
        self: Arc<Self>,
        invocation: Arc<Invocation>,
        logic: Arc<dyn StepLogic>,
        envelope: WorkflowEnvelope,
        launched: i64,
    ) -> Result<ChainOutcome, HostError> {
        let function = invocation.function.clone();
        let trial = envelope.trial();

        let step = {
            let host = Arc::clone(&self);
            let invocation = Arc::clone(&invocation);
            let envelope = envelope.clone();
            tokio::task::spawn_blocking(move || {
                let launcher = ChildLauncher {
                    host: Arc::clone(&host),
                    parent: Arc::clone(&invocation),
                };
                let syscalls = StepSyscalls::new(
                    host.store.as_ref(),
                    host.config.key_scope,
                    envelope.trial(),
                    &launcher,
                    invocation.as_ref(),
                );
                chain::handle(envelope, logic.as_ref(), &syscalls)
            })
            .await
        };
        let own_completed = self.clock.now_ns();
        let step = match step {
            Ok(result) => result.map_err(|source| HostError::StepFailed {
                function: function.clone(),
                source,
            }),
            Err(join_error) => Err(HostError::Aborted {
                function: function.clone(),
                message: join_error.to_string(),
            }),
        };

        match &step {
            Ok(result) => {
                let transition = invocation
                    .state
                    .lock()
                    .expect("poisoned mutex")
                    .complete(own_completed);
                if let Transition::Released { at } = transition {
                    invocation.release(at, Some(result.clone()));
                }
            }
            Err(step_error) => {
                invocation.abandon_release();
                let released = invocation.state.lock().expect("poisoned mutex").is_released();
                if released {
                    error!(
                        function = %function,
                        trial = ?trial,
                        error = %step_error,
                        "invocation_failed_after_externalization"
                    );
                } else {
                    warn!(function = %function, trial = ?trial, error = %step_error, "invocation_failed");
                }
            }
        }

        let mut chain_completed = own_completed;
        let mut failed_descendants = 0usize;
        for child in invocation.take_children() {
            match child.await {
                Ok(Ok(outcome)) => {
                    chain_completed = chain_completed.max(outcome.completed_at);
                    failed_descendants += outcome.failed_descendants;
                }
                Ok(Err(child_error)) => {
                    warn!(parent = %function, error = %child_error, "descendant_failed");
                    chain_completed = chain_completed.max(self.clock.now_ns());
                    failed_descendants += 1;
                }
                Err(join_error) => {
                    warn!(parent = %function, error = %join_error, "descendant_aborted");
                    chain_completed = chain_completed.max(self.clock.now_ns());
                    failed_descendants += 1;
                }
            }
        }

        let result = step?;
        let state = *invocation.state.lock().expect("poisoned mutex");
        let completed =
            recorded_completion(self.config.policy, &state, chain_completed).unwrap_or(chain_completed);

        self.sink.record(ExecutionRecord {
            launched,
            completed,
            request: RecordedRequest {
                function: function.clone(),
                payload: envelope,
            },
        });
        info!(
            function = %function,
            trial = ?trial,
            policy = %self.config.policy,
            launched,
            completed,
            runtime_ns = completed - launched,
            "invocation_recorded"
        );

        Ok(ChainOutcome {
            function,
            result,
            completed_at: chain_completed,
            failed_descendants,
        })
    }
}

async fn join_chain(function: &str, handle: ChainHandle) -> Result<ChainOutcome, HostError> {
    handle.await.map_err(|join_error| HostError::Aborted {
        function: function.to_string(),
        message: join_error.to_string(),
    })?
}
