//! Per-environment working directories and output logs.
//!
//! Layout: `<root>/<namespace>/output.log`. A [`Namespace`] is always a single
//! path component, so these helpers can never reach outside `<root>`.

use std::fs::File;
use std::path::{Path, PathBuf};

use envbox_common::constants::OUTPUT_LOG;
use envbox_common::error::{EnvboxError, Result};
use envbox_common::types::Namespace;

/// Returns the working directory of an environment.
#[must_use]
pub fn workdir(root: &Path, namespace: &Namespace) -> PathBuf {
    root.join(namespace.as_str())
}

/// Returns the output log path of an environment.
#[must_use]
pub fn log_path(root: &Path, namespace: &Namespace) -> PathBuf {
    workdir(root, namespace).join(OUTPUT_LOG)
}

/// Creates `workdir` and an empty log file at `log`, truncating any
/// output from a previous run.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn prepare_output(workdir: &Path, log: &Path) -> Result<()> {
    std::fs::create_dir_all(workdir).map_err(|e| EnvboxError::Io {
        path: workdir.to_path_buf(),
        source: e,
    })?;
    let _ = File::create(log).map_err(|e| EnvboxError::Io {
        path: log.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Reads an environment's output log.
///
/// Returns `None` if the log does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_output(root: &Path, namespace: &Namespace) -> Result<Option<String>> {
    let path = log_path(root, namespace);
    match std::fs::read(&path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EnvboxError::Io { path, source: e }),
    }
}

/// Removes an environment's working directory.
///
/// Returns `false` if there was nothing to remove.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_workdir(root: &Path, namespace: &Namespace) -> Result<bool> {
    let dir = workdir(root, namespace);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(EnvboxError::Io { path: dir, source: e }),
    }
}
