use extsync_core::contract::WorkflowEnvelope;
use extsync_core::syscalls::SyscallError;

/// Starts a successor invocation without waiting for it.
pub trait ContinuationInvoker: Send + Sync {
    fn invoke_async(&self, function: &str, envelope: WorkflowEnvelope) -> Result<(), SyscallError>;
}

/// Receives the externalization signal of the running invocation.
pub trait ExternalizeSignal: Send + Sync {
    fn externalize(&self);
}

#[cfg(any(test, feature = "test-helpers"))]
pub use doubles::{CapturingInvoker, CountingSignal};

/// Recording stand-ins for driving `StepSyscalls` without a host.
#[cfg(any(test, feature = "test-helpers"))]
mod doubles {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct CapturingInvoker {
        issued: Mutex<Vec<(String, WorkflowEnvelope)>>,
    }

    impl CapturingInvoker {
        pub fn issued(&self) -> Vec<(String, WorkflowEnvelope)> {
            self.issued.lock().expect("poisoned mutex").clone()
        }
    }

    impl ContinuationInvoker for CapturingInvoker {
        fn invoke_async(
            &self,
            function: &str,
            envelope: WorkflowEnvelope,
        ) -> Result<(), SyscallError> {
            self.issued
                .lock()
                .expect("poisoned mutex")
                .push((function.to_string(), envelope));
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    pub struct CountingSignal {
        count: Mutex<usize>,
    }

    impl CountingSignal {
        pub fn count(&self) -> usize {
            *self.count.lock().expect("poisoned mutex")
        }
    }

    impl ExternalizeSignal for CountingSignal {
        fn externalize(&self) {
            *self.count.lock().expect("poisoned mutex") += 1;
        }
    }
}
