//! Test helpers for exercising workflow steps without a host.
//!
//! [`MemorySyscalls`] keeps a plain key-value map, records issued invokes and
//! counts externalization signals instead of forwarding them to the store.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::syscalls::{is_externalize_signal, SyscallError, Syscalls};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInvoke {
    pub function: String,
    pub payload: String,
}

#[derive(Debug, Default)]
pub struct MemorySyscalls {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    invokes: Mutex<Vec<IssuedInvoke>>,
    externalizations: Mutex<usize>,
    read_failure: Mutex<Option<SyscallError>>,
    invoke_failure: Mutex<Option<SyscallError>>,
}

impl MemorySyscalls {
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let syscalls = Self::default();
        {
            let mut map = syscalls.entries.lock().expect("poisoned mutex");
            for (key, value) in entries {
                map.insert(key.as_bytes().to_vec(), value.as_bytes().to_vec());
            }
        }
        syscalls
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("poisoned mutex")
            .get(key.as_bytes())
            .map(|value| String::from_utf8_lossy(value).into_owned())
    }

    pub fn key_count(&self) -> usize {
        self.entries.lock().expect("poisoned mutex").len()
    }

    pub fn invokes(&self) -> Vec<IssuedInvoke> {
        self.invokes.lock().expect("poisoned mutex").clone()
    }

    pub fn externalize_count(&self) -> usize {
        *self.externalizations.lock().expect("poisoned mutex")
    }

    pub fn fail_reads_with(&self, error: SyscallError) {
        *self.read_failure.lock().expect("poisoned mutex") = Some(error);
    }

    pub fn fail_invokes_with(&self, error: SyscallError) {
        *self.invoke_failure.lock().expect("poisoned mutex") = Some(error);
    }
}

impl Syscalls for MemorySyscalls {
    fn read_key(&self, key: &[u8]) -> Result<Vec<u8>, SyscallError> {
        if let Some(error) = self.read_failure.lock().expect("poisoned mutex").clone() {
            return Err(error);
        }
        self.entries
            .lock()
            .expect("poisoned mutex")
            .get(key)
            .cloned()
            .ok_or_else(|| SyscallError::not_found(key))
    }

    fn write_key(&self, key: &[u8], value: &[u8]) -> Result<(), SyscallError> {
        if is_externalize_signal(key, value) {
            *self.externalizations.lock().expect("poisoned mutex") += 1;
            return Ok(());
        }
        self.entries
            .lock()
            .expect("poisoned mutex")
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn invoke(&self, function: &str, payload: &str) -> Result<(), SyscallError> {
        if let Some(error) = self.invoke_failure.lock().expect("poisoned mutex").clone() {
            return Err(error);
        }
        self.invokes
            .lock()
            .expect("poisoned mutex")
            .push(IssuedInvoke {
                function: function.to_string(),
                payload: payload.to_string(),
            });
        Ok(())
    }
}
