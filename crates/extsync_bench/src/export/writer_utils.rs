use std::fs::{self, File};
use std::path::Path;

use super::ExportError;

pub(crate) fn ensure_not_empty<T>(items: &[T], path: &Path) -> Result<(), ExportError> {
    if items.is_empty() {
        return Err(ExportError::Empty(path.to_path_buf()));
    }

    Ok(())
}

pub(crate) fn create_output_file(path: &Path) -> Result<File, ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    File::create(path).map_err(io_error)
}
