use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use extsync_core::contract::KeyScope;
use extsync_core::syscalls::SyscallError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("store backend failed on key '{key}': {message}")]
    Backend { key: String, message: String },
}

impl KvError {
    pub fn backend(key: &[u8], message: impl Into<String>) -> Self {
        Self::Backend {
            key: String::from_utf8_lossy(key).into_owned(),
            message: message.into(),
        }
    }
}

impl From<KvError> for SyscallError {
    fn from(error: KvError) -> Self {
        SyscallError::Store(error.to_string())
    }
}

/// Backing store shared by every invocation of a host.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    /// Stores `value` only when `key` is absent; returns whether it did.
    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool, KvError>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        (**self).put(key, value)
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool, KvError> {
        (**self).put_if_absent(key, value)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKv {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("poisoned mutex").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.lock().expect("poisoned mutex").contains_key(key)
    }
}

impl KvStore for InMemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.entries.lock().expect("poisoned mutex").get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.entries
            .lock()
            .expect("poisoned mutex")
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().expect("poisoned mutex");
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_vec(), value.to_vec());
        Ok(true)
    }
}

/// Adds a fixed latency to every write, standing in for a remote store.
#[derive(Debug)]
pub struct DelayedKv<S> {
    inner: S,
    write_delay: Duration,
}

impl<S: KvStore> DelayedKv<S> {
    pub fn new(inner: S, write_delay: Duration) -> Self {
        Self { inner, write_delay }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn wait(&self) {
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
    }
}

impl<S: KvStore> KvStore for DelayedKv<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.wait();
        self.inner.put(key, value)
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool, KvError> {
        self.wait();
        self.inner.put_if_absent(key, value)
    }
}

/// Prefix applied to step keys under `scope`.
///
/// Per-trial scoping isolates concurrent or repeated trials from each
/// other's first-visit checks; warm-ups share one namespace.
pub fn key_prefix(scope: KeyScope, trial: Option<i64>) -> Vec<u8> {
    match (scope, trial) {
        (KeyScope::Shared, _) => Vec::new(),
        (KeyScope::PerTrial, Some(trial)) => format!("trial/{trial}/").into_bytes(),
        (KeyScope::PerTrial, None) => b"warmup/".to_vec(),
    }
}

pub fn scoped_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut scoped = Vec::with_capacity(prefix.len() + key.len());
    scoped.extend_from_slice(prefix);
    scoped.extend_from_slice(key);
    scoped
}
