use extsync_core::contract::{KeyScope, WorkflowEnvelope};
use extsync_core::syscalls::{is_externalize_signal, FsSyscalls, SyscallError, Syscalls};

use crate::adapters::invoke::{ContinuationInvoker, ExternalizeSignal};
use crate::adapters::kv_store::{key_prefix, scoped_key, KvStore};
use crate::adapters::labeled_fs::LabeledFs;

/// Syscall surface handed to a single step.
///
/// Reads and writes go straight to the shared store under the trial's key
/// prefix. The externalization sentinel is diverted to `signal` and never
/// stored.
pub struct StepSyscalls<'a> {
    store: &'a dyn KvStore,
    prefix: Vec<u8>,
    invoker: &'a dyn ContinuationInvoker,
    signal: &'a dyn ExternalizeSignal,
    fs: LabeledFs<'a>,
}

impl<'a> StepSyscalls<'a> {
    pub fn new(
        store: &'a dyn KvStore,
        scope: KeyScope,
        trial: Option<i64>,
        invoker: &'a dyn ContinuationInvoker,
        signal: &'a dyn ExternalizeSignal,
    ) -> Self {
        let prefix = key_prefix(scope, trial);
        Self {
            store,
            fs: LabeledFs::new(store, &prefix),
            prefix,
            invoker,
            signal,
        }
    }
}

impl Syscalls for StepSyscalls<'_> {
    fn read_key(&self, key: &[u8]) -> Result<Vec<u8>, SyscallError> {
        self.store
            .get(&scoped_key(&self.prefix, key))?
            .ok_or_else(|| SyscallError::not_found(key))
    }

    fn write_key(&self, key: &[u8], value: &[u8]) -> Result<(), SyscallError> {
        if is_externalize_signal(key, value) {
            self.signal.externalize();
            return Ok(());
        }
        self.store
            .put(&scoped_key(&self.prefix, key), value)
            .map_err(SyscallError::from)
    }

    fn invoke(&self, function: &str, payload: &str) -> Result<(), SyscallError> {
        let envelope = WorkflowEnvelope::from_payload(payload)
            .map_err(|error| SyscallError::MalformedPayload(error.to_string()))?;
        self.invoker.invoke_async(function, envelope)
    }

    fn fs(&self) -> Option<&dyn FsSyscalls> {
        Some(&self.fs)
    }
}
