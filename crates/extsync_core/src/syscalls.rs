use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Writing this key with [`EXTERNALIZE_VALUE`] marks the externalization
/// point. It is a control signal and never reaches the store.
pub const EXTERNALIZE_KEY: &[u8] = b"EXTERNALIZE";
pub const EXTERNALIZE_VALUE: &[u8] = b"EXTERNALIZE";

pub fn is_externalize_signal(key: &[u8], value: &[u8]) -> bool {
    key == EXTERNALIZE_KEY && value == EXTERNALIZE_VALUE
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("malformed path '{0}'")]
    BadPath(String),
    #[error("no such file or directory '{0}'")]
    NotFound(String),
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error("'{0}' is not a file")]
    NotAFile(String),
    #[error("'{0}' is not a directory")]
    NotADirectory(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyscallError {
    #[error("key '{key}' not found")]
    NotFound { key: String },
    #[error("store failure: {0}")]
    Store(String),
    #[error("malformed invoke payload: {0}")]
    MalformedPayload(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("invoke of '{function}' failed: {reason}")]
    Invoke { function: String, reason: String },
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl SyscallError {
    pub fn not_found(key: &[u8]) -> Self {
        Self::NotFound {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }
}

/// Capability surface a workflow step may call into.
pub trait Syscalls: Send + Sync {
    fn read_key(&self, key: &[u8]) -> Result<Vec<u8>, SyscallError>;

    fn write_key(&self, key: &[u8], value: &[u8]) -> Result<(), SyscallError>;

    /// Asynchronously starts `function` with a JSON-encoded envelope. Returns
    /// once the invocation is issued, not when it finishes.
    fn invoke(&self, function: &str, payload: &str) -> Result<(), SyscallError>;

    fn externalize(&self) -> Result<(), SyscallError> {
        self.write_key(EXTERNALIZE_KEY, EXTERNALIZE_VALUE)
    }

    /// The path-based storage variant, when the host offers one.
    fn fs(&self) -> Option<&dyn FsSyscalls> {
        None
    }
}

/// Opaque isolation label attached to filesystem calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(String);

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn public() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path-based variant of the storage syscalls.
pub trait FsSyscalls: Send + Sync {
    fn create_dir(&self, path: &str, label: &Label) -> Result<(), SyscallError>;

    fn create_file(&self, path: &str, label: &Label) -> Result<(), SyscallError>;

    fn write(&self, path: &str, data: &[u8], label: &Label) -> Result<(), SyscallError>;

    fn read(&self, path: &str, label: &Label) -> Result<Vec<u8>, SyscallError>;
}
