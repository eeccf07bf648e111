//! Saving a workbook over its file without leaving a half-written package.
//!
//! The package is serialised in memory, written to a sibling temp file and
//! moved over the target. A target held open by another program (a
//! spreadsheet application typically) is reported as [`SaveError::FileLocked`].

use std::{
    error::Error as StdError,
    fs::OpenOptions,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::Workbook;

#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("{} is open in another program", path.display())]
    FileLocked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not save {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// `true` for errors meaning "someone else has this file open".
pub fn is_lock_conflict(err: &io::Error) -> bool {
    if err.kind() == ErrorKind::ResourceBusy {
        return true;
    }
    #[cfg(windows)]
    {
        if matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        ) || err.kind() == ErrorKind::PermissionDenied
        {
            return true;
        }
    }
    false
}

pub fn classify(path: &Path, err: io::Error) -> SaveError {
    if is_lock_conflict(&err) {
        SaveError::FileLocked {
            path: path.to_path_buf(),
            source: err,
        }
    } else {
        SaveError::Io {
            path: path.to_path_buf(),
            source: Box::new(err),
        }
    }
}

/// Serialises `workbook` and replaces `path` with it. Not retried.
pub fn save(workbook: &Workbook, path: &Path) -> Result<(), SaveError> {
    let bytes = workbook.to_xlsx_bytes().map_err(|err| SaveError::Io {
        path: path.to_path_buf(),
        source: err.into(),
    })?;
    write_atomically(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "saved workbook");
    Ok(())
}

pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), SaveError> {
    let permissions = if path.exists() {
        // opening for write fails fast while the file is held elsewhere
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|err| classify(path, err))?;
        Some(file.metadata().map_err(|err| classify(path, err))?.permissions())
    } else {
        None
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| classify(path, err))?;
    tmp.write_all(bytes).map_err(|err| classify(path, err))?;
    // the temp file is created owner-only; the ledger keeps its own mode
    if let Some(permissions) = permissions {
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|err| classify(path, err))?;
    }
    tmp.as_file().sync_all().map_err(|err| classify(path, err))?;
    debug!(tmp = %tmp.path().display(), "moving temp file over target");
    tmp.persist(path).map_err(|err| classify(path, err.error))?;
    Ok(())
}
