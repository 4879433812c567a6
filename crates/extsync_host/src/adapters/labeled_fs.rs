use serde::{Deserialize, Serialize};

use extsync_core::syscalls::{FsError, FsSyscalls, Label, SyscallError};

use super::kv_store::{scoped_key, KvStore};

const FS_NAMESPACE: &[u8] = b"fs:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum FsEntry {
    Directory { label: Label },
    File { label: Label, data: Vec<u8> },
}

/// Hierarchical files and directories kept as entries of a [`KvStore`].
///
/// The root directory always exists. Labels are stored with each entry and
/// passed through untouched.
pub struct LabeledFs<'a> {
    store: &'a dyn KvStore,
    prefix: Vec<u8>,
}

impl<'a> LabeledFs<'a> {
    pub fn new(store: &'a dyn KvStore, key_prefix: &[u8]) -> Self {
        Self {
            store,
            prefix: scoped_key(key_prefix, FS_NAMESPACE),
        }
    }

    fn entry_key(&self, components: &[&str]) -> Vec<u8> {
        scoped_key(&self.prefix, format!("/{}", components.join("/")).as_bytes())
    }

    fn load(&self, components: &[&str]) -> Result<Option<FsEntry>, SyscallError> {
        if components.is_empty() {
            return Ok(Some(FsEntry::Directory {
                label: Label::public(),
            }));
        }
        let Some(raw) = self
            .store
            .get(&self.entry_key(components))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|error| SyscallError::Store(format!("corrupt filesystem entry: {error}")))
    }

    fn create(&self, path: &str, entry: FsEntry) -> Result<(), SyscallError> {
        let components = split_path(path)?;
        let Some((_, parent)) = components.split_last() else {
            return Err(FsError::AlreadyExists(path.to_string()).into());
        };
        match self.load(parent)? {
            None => return Err(FsError::NotFound(join(parent)).into()),
            Some(FsEntry::File { .. }) => return Err(FsError::NotADirectory(join(parent)).into()),
            Some(FsEntry::Directory { .. }) => {}
        }
        let body = serde_json::to_vec(&entry)
            .map_err(|error| SyscallError::Store(format!("cannot encode entry: {error}")))?;
        let created = self
            .store
            .put_if_absent(&self.entry_key(&components), &body)?;
        if created {
            Ok(())
        } else {
            Err(FsError::AlreadyExists(join(&components)).into())
        }
    }
}

impl FsSyscalls for LabeledFs<'_> {
    fn create_dir(&self, path: &str, label: &Label) -> Result<(), SyscallError> {
        self.create(
            path,
            FsEntry::Directory {
                label: label.clone(),
            },
        )
    }

    fn create_file(&self, path: &str, label: &Label) -> Result<(), SyscallError> {
        self.create(
            path,
            FsEntry::File {
                label: label.clone(),
                data: Vec::new(),
            },
        )
    }

    fn write(&self, path: &str, data: &[u8], _label: &Label) -> Result<(), SyscallError> {
        let components = split_path(path)?;
        let label = match self.load(&components)? {
            None => return Err(FsError::NotFound(join(&components)).into()),
            Some(FsEntry::Directory { .. }) => return Err(FsError::NotAFile(join(&components)).into()),
            Some(FsEntry::File { label, .. }) => label,
        };
        let body = serde_json::to_vec(&FsEntry::File {
            label,
            data: data.to_vec(),
        })
        .map_err(|error| SyscallError::Store(format!("cannot encode entry: {error}")))?;
        self.store
            .put(&self.entry_key(&components), &body)
            .map_err(SyscallError::from)
    }

    fn read(&self, path: &str, _label: &Label) -> Result<Vec<u8>, SyscallError> {
        let components = split_path(path)?;
        match self.load(&components)? {
            None => Err(FsError::NotFound(join(&components)).into()),
            Some(FsEntry::Directory { .. }) => Err(FsError::NotAFile(join(&components)).into()),
            Some(FsEntry::File { data, .. }) => Ok(data),
        }
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, FsError> {
    let bad_path = || FsError::BadPath(path.to_string());
    let relative = path.strip_prefix('/').ok_or_else(bad_path)?;
    if relative.is_empty() {
        return Ok(Vec::new());
    }
    let relative = relative.strip_suffix('/').unwrap_or(relative);
    let components: Vec<&str> = relative.split('/').collect();
    if components
        .iter()
        .any(|component| component.is_empty() || *component == "." || *component == "..")
    {
        return Err(bad_path());
    }
    Ok(components)
}

fn join(components: &[&str]) -> String {
    format!("/{}", components.join("/"))
}
